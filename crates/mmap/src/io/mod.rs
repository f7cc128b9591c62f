//! Streaming adapters over `Memory`
//!
//! Readers hold a cursor into a [`Memory`](crate::Memory) and never copy
//! the backing bytes beyond what the caller asks for:
//!
//! - [`MemoryDataInput`] - sequential typed reads ([`DataInput`])
//! - [`MemoryInputStream`] - `std::io::Read` + `Seek`
//! - [`MemoryScatteringReader`] - reads spread over several destinations
//!
//! Writers append and double their backing storage on overflow:
//!
//! - [`ZeroCopyOutputStream`] - over a [`NativeBuffer`](crate::NativeBuffer)
//! - [`DynamicMMapWriter`] - over a growing file mapping
//!
//! Variable-length text is not supported in either direction; those calls
//! fail with [`MemoryError::Unsupported`].

mod data_input;
mod dynamic;
mod input_stream;
mod scatter;
mod zero_copy;

pub use self::data_input::MemoryDataInput;
pub use self::dynamic::DynamicMMapWriter;
pub use self::input_stream::MemoryInputStream;
pub use self::scatter::MemoryScatteringReader;
pub use self::zero_copy::ZeroCopyOutputStream;
use crate::access::Primitive;
use crate::error::{MemoryError, MemoryResult};

/// Sequential typed reader; every read advances the cursor by its width
pub trait DataInput {
    /// Read one scalar, or fail with [`MemoryError::EndOfStream`].
    fn read_value<T: Primitive>(&mut self) -> MemoryResult<T>;

    /// Fill all of `dst`, or fail without moving the cursor.
    fn read_fully(&mut self, dst: &mut [u8]) -> MemoryResult<()>;

    /// Skip up to `n` bytes; returns how many were skipped.
    fn skip_bytes(&mut self, n: usize) -> MemoryResult<usize>;

    fn read_bool(&mut self) -> MemoryResult<bool> {
        self.read_value::<u8>().map(|b| b != 0)
    }

    /// Unsigned byte
    fn read_u8(&mut self) -> MemoryResult<u8> {
        self.read_value()
    }

    fn read_i8(&mut self) -> MemoryResult<i8> {
        self.read_value()
    }

    fn read_i16(&mut self) -> MemoryResult<i16> {
        self.read_value()
    }

    /// Unsigned short, also a UTF-16 code unit
    fn read_u16(&mut self) -> MemoryResult<u16> {
        self.read_value()
    }

    fn read_i32(&mut self) -> MemoryResult<i32> {
        self.read_value()
    }

    fn read_i64(&mut self) -> MemoryResult<i64> {
        self.read_value()
    }

    fn read_f32(&mut self) -> MemoryResult<f32> {
        self.read_value()
    }

    fn read_f64(&mut self) -> MemoryResult<f64> {
        self.read_value()
    }

    fn read_line(&mut self) -> MemoryResult<String> {
        Err(MemoryError::unsupported("read_line"))
    }

    fn read_utf(&mut self) -> MemoryResult<String> {
        Err(MemoryError::unsupported("read_utf"))
    }
}

/// Append-only typed writer
pub trait DataOutput {
    /// Append one scalar in the writer's byte order.
    fn write_value<T: Primitive>(&mut self, value: T) -> MemoryResult<()>;

    /// Append raw bytes.
    fn write_slice(&mut self, bytes: &[u8]) -> MemoryResult<()>;

    fn write_bool(&mut self, value: bool) -> MemoryResult<()> {
        self.write_value(u8::from(value))
    }

    fn write_u8(&mut self, value: u8) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_i8(&mut self, value: i8) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_i16(&mut self, value: i16) -> MemoryResult<()> {
        self.write_value(value)
    }

    /// UTF-16 code unit
    fn write_u16(&mut self, value: u16) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_i32(&mut self, value: i32) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_i64(&mut self, value: i64) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_f32(&mut self, value: f32) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_f64(&mut self, value: f64) -> MemoryResult<()> {
        self.write_value(value)
    }

    fn write_utf(&mut self, _text: &str) -> MemoryResult<()> {
        Err(MemoryError::unsupported("write_utf"))
    }

    fn write_chars(&mut self, _text: &str) -> MemoryResult<()> {
        Err(MemoryError::unsupported("write_chars"))
    }

    fn write_string_bytes(&mut self, _text: &str) -> MemoryResult<()> {
        Err(MemoryError::unsupported("write_string_bytes"))
    }
}

/// Smallest doubling of `capacity` (at least 1) that holds `required` bytes
pub(crate) fn grown_capacity(capacity: usize, required: usize) -> MemoryResult<usize> {
    let mut capacity = capacity.max(1);
    while capacity < required {
        capacity = capacity
            .checked_mul(2)
            .ok_or_else(|| MemoryError::out_of_memory("grow", required))?;
    }
    Ok(capacity)
}
