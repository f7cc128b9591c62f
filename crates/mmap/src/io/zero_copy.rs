use std::io::{self, Write};

use super::{DataOutput, MemoryInputStream, grown_capacity};
use crate::access::Primitive;
use crate::config::NativeBufferConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::{DirectMemory, Memory};
use crate::native::NativeBuffer;
use crate::order::ByteOrder;

/// Initial capacity of [`ZeroCopyOutputStream::new`]
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Append-only writer over a [`NativeBuffer`] that exposes what it wrote
/// without copying
///
/// A write that does not fit doubles the buffer (repeatedly, if needed)
/// before it lands. Views returned by [`memory`](Self::memory) and
/// [`input_stream`](Self::input_stream) borrow the stream, so they cannot be
/// held across another write or a close.
#[derive(Debug)]
pub struct ZeroCopyOutputStream {
    buffer: NativeBuffer,
    position: usize,
}

impl ZeroCopyOutputStream {
    /// 64 KiB, big-endian
    pub fn new() -> MemoryResult<Self> {
        Self::with_capacity(DEFAULT_CAPACITY, ByteOrder::BigEndian)
    }

    pub fn with_capacity(capacity: usize, order: ByteOrder) -> MemoryResult<Self> {
        Ok(Self {
            buffer: NativeBuffer::new(capacity, order)?,
            position: 0,
        })
    }

    pub fn with_config(
        capacity: usize,
        order: ByteOrder,
        config: NativeBufferConfig,
    ) -> MemoryResult<Self> {
        Ok(Self {
            buffer: NativeBuffer::with_config(capacity, order, config)?,
            position: 0,
        })
    }

    /// Bytes written so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current size of the backing buffer
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn order(&self) -> ByteOrder {
        self.buffer.order()
    }

    /// The written prefix `[0, position)`
    pub fn memory(&self) -> MemoryResult<DirectMemory<'_>> {
        self.ensure_open()?;
        self.buffer.memory().slice(0, self.position)
    }

    /// Stream over the written prefix
    pub fn input_stream(&self) -> MemoryResult<MemoryInputStream<DirectMemory<'_>>> {
        Ok(MemoryInputStream::new(self.memory()?))
    }

    /// Copy the written prefix into `out`; returns the byte count.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> MemoryResult<u64> {
        let mut input = self.input_stream()?;
        io::copy(&mut input, out).map_err(|e| MemoryError::io("copy zero-copy stream", e))
    }

    /// Release the buffer. A second call does nothing.
    pub fn close(&mut self) -> MemoryResult<()> {
        self.buffer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }

    fn ensure_open(&self) -> MemoryResult<()> {
        if self.buffer.is_closed() {
            return Err(MemoryError::invalid_state("zero-copy stream is closed"));
        }
        Ok(())
    }

    /// Grow until `needed` more bytes fit after the cursor.
    fn reserve(&mut self, needed: usize) -> MemoryResult<usize> {
        self.ensure_open()?;
        let end = self
            .position
            .checked_add(needed)
            .ok_or_else(|| MemoryError::out_of_memory("grow", usize::MAX))?;
        if end > self.buffer.len() {
            let capacity = grown_capacity(self.buffer.len(), end)?;
            self.buffer.realloc(capacity)?;
        }
        Ok(self.position)
    }
}

impl DataOutput for ZeroCopyOutputStream {
    fn write_value<T: Primitive>(&mut self, value: T) -> MemoryResult<()> {
        let at = self.reserve(T::SIZE)?;
        value.store(&self.buffer.memory(), at)?;
        self.position += T::SIZE;
        Ok(())
    }

    fn write_slice(&mut self, bytes: &[u8]) -> MemoryResult<()> {
        let at = self.reserve(bytes.len())?;
        self.buffer.memory().put_bytes(at, bytes)?;
        self.position += bytes.len();
        Ok(())
    }
}

impl Write for ZeroCopyOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
