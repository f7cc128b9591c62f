//! The `Memory` contract and its two implementations
//!
//! A [`Memory`] is an addressable byte range `[0, length)` with typed scalar
//! accessors, bulk copies and zero-copy slicing. Offsets are always measured
//! from the view's own origin.
//!
//! - [`HeapMemory`] is backed by a reference-counted heap array.
//! - [`DirectMemory`] is a borrowed view over a native region owned by an
//!   [`MMapBuffer`](crate::MMapBuffer) or a [`NativeBuffer`](crate::NativeBuffer).
//!
//! Views allow mutation through `&self`: several views of the same storage
//! may be alive at once, like several pointers into the same region. They are
//! neither `Send` nor `Sync`, so that sharing never crosses threads.

use core::marker::PhantomData;

use bytes::{Buf, BufMut};

pub use self::direct::DirectMemory;
pub use self::heap::{HeapBuffer, HeapMemory};
use crate::access::{DirectDataAccess, Primitive};
use crate::array::{
    ByteArray, CharArray, DoubleArray, FloatArray, IntArray, LongArray, ShortArray, TypedArray,
};
use crate::error::{MemoryError, MemoryResult};
use crate::order::ByteOrder;

mod private {
    pub trait Sealed {}

    impl Sealed for super::HeapMemory {}
    impl Sealed for super::DirectMemory<'_> {}
}

/// Scratch size used when staging bytes through an external buffer
const STAGING_CHUNK: usize = 4096;

/// Fail unless `offset + width <= length`.
#[inline]
pub(crate) fn check_range(offset: usize, width: usize, length: usize) -> MemoryResult<()> {
    match offset.checked_add(width) {
        Some(end) if end <= length => Ok(()),
        _ => Err(MemoryError::out_of_bounds(offset, width, length)),
    }
}

/// Fail unless `[start, start + length)` lies within `available` bytes.
#[inline]
pub(crate) fn check_slice(start: usize, length: usize, available: usize) -> MemoryResult<()> {
    match start.checked_add(length) {
        Some(end) if end <= available => Ok(()),
        _ => Err(MemoryError::invalid_range(start, length, available)),
    }
}

/// Raw extent of a view, used for memory-to-memory copies
#[doc(hidden)]
#[derive(Debug, Clone, Copy)]
pub struct Region<'a> {
    ptr: *mut u8,
    len: usize,
    writable: bool,
    _marker: PhantomData<&'a ()>,
}

impl Region<'_> {
    pub(crate) fn new(ptr: *mut u8, len: usize, writable: bool) -> Self {
        Self {
            ptr,
            len,
            writable,
            _marker: PhantomData,
        }
    }

    fn readable_at(&self, offset: usize, length: usize) -> MemoryResult<*const u8> {
        check_range(offset, length, self.len)?;
        Ok(self.ptr.wrapping_add(offset).cast_const())
    }

    fn writable_at(&self, offset: usize, length: usize) -> MemoryResult<*mut u8> {
        check_range(offset, length, self.len)?;
        if !self.writable {
            return Err(MemoryError::ReadOnly { offset, length });
        }
        Ok(self.ptr.wrapping_add(offset))
    }
}

/// Copy `length` bytes between two regions after checking both ends.
fn copy_between(
    src: Region<'_>,
    src_offset: usize,
    dst: Region<'_>,
    dst_offset: usize,
    length: usize,
) -> MemoryResult<()> {
    let from = src.readable_at(src_offset, length)?;
    let to = dst.writable_at(dst_offset, length)?;
    // SAFETY: both ranges were bounds-checked against live regions; the copy
    // has memmove semantics so the ranges may overlap.
    unsafe { DirectDataAccess::copy_memory(from, to, length) };
    Ok(())
}

/// Generates the scalar accessors of a `Memory` impl from generic
/// `read::<T>` / `write::<T>` helpers on the implementing type.
macro_rules! memory_scalars {
    ($($get:ident, $put:ident, $ty:ty;)*) => {
        $(
            #[inline]
            fn $get(&self, offset: usize) -> MemoryResult<$ty> {
                self.read::<$ty>(offset)
            }

            #[inline]
            fn $put(&self, offset: usize, value: $ty) -> MemoryResult<()> {
                self.write::<$ty>(offset, value)
            }
        )*
    };
}

mod direct;
mod heap;

/// Addressable, bounds-checked, byte-order-aware byte range
///
/// Scalar accessors honor [`order`](Memory::order); bulk copies are raw
/// byte mirrors and never reinterpret byte order, even between views with
/// different declared orders.
///
/// The trait is sealed. It is object safe, so peers in bulk copies are passed
/// as `&dyn Memory`.
pub trait Memory: private::Sealed {
    /// Number of addressable bytes
    fn length(&self) -> usize;

    /// Whether the bytes live outside the Rust heap
    fn is_direct(&self) -> bool;

    /// Byte order used by the scalar accessors
    fn order(&self) -> ByteOrder;

    fn get_u8(&self, offset: usize) -> MemoryResult<u8>;
    fn put_u8(&self, offset: usize, value: u8) -> MemoryResult<()>;
    fn get_i16(&self, offset: usize) -> MemoryResult<i16>;
    fn put_i16(&self, offset: usize, value: i16) -> MemoryResult<()>;
    /// Read a UTF-16 code unit
    fn get_u16(&self, offset: usize) -> MemoryResult<u16>;
    fn put_u16(&self, offset: usize, value: u16) -> MemoryResult<()>;
    fn get_i32(&self, offset: usize) -> MemoryResult<i32>;
    fn put_i32(&self, offset: usize, value: i32) -> MemoryResult<()>;
    fn get_i64(&self, offset: usize) -> MemoryResult<i64>;
    fn put_i64(&self, offset: usize, value: i64) -> MemoryResult<()>;
    fn get_f32(&self, offset: usize) -> MemoryResult<f32>;
    fn put_f32(&self, offset: usize, value: f32) -> MemoryResult<()>;
    fn get_f64(&self, offset: usize) -> MemoryResult<f64>;
    fn put_f64(&self, offset: usize, value: f64) -> MemoryResult<()>;

    fn get_i8(&self, offset: usize) -> MemoryResult<i8> {
        self.get_u8(offset).map(|b| b as i8)
    }

    fn put_i8(&self, offset: usize, value: i8) -> MemoryResult<()> {
        self.put_u8(offset, value as u8)
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    fn get_bytes(&self, offset: usize, dst: &mut [u8]) -> MemoryResult<()>;

    /// Copy all of `src` into this memory starting at `offset`.
    fn put_bytes(&self, offset: usize, src: &[u8]) -> MemoryResult<()>;

    #[doc(hidden)]
    fn region(&self) -> Region<'_>;

    /// Copy `length` bytes from `[offset, offset + length)` into `dst` at
    /// `dst_offset`.
    fn get_memory(
        &self,
        offset: usize,
        dst: &dyn Memory,
        dst_offset: usize,
        length: usize,
    ) -> MemoryResult<()> {
        copy_between(self.region(), offset, dst.region(), dst_offset, length)
    }

    /// Copy `length` bytes from `src` at `src_offset` into this memory at
    /// `offset`.
    fn put_memory(
        &self,
        offset: usize,
        src: &dyn Memory,
        src_offset: usize,
        length: usize,
    ) -> MemoryResult<()> {
        copy_between(src.region(), src_offset, self.region(), offset, length)
    }

    /// Copy the whole of `src` into this memory at `offset`.
    fn put_all(&self, offset: usize, src: &dyn Memory) -> MemoryResult<()> {
        self.put_memory(offset, src, 0, src.length())
    }

    /// View of `[start, start + length)` sharing this memory's storage
    fn slice(&self, start: usize, length: usize) -> MemoryResult<Self>
    where
        Self: Sized;

    /// Copy `length` bytes at `offset` into an external buffer, advancing it.
    fn get_buf<B: BufMut>(&self, offset: usize, dst: &mut B, length: usize) -> MemoryResult<()>
    where
        Self: Sized,
    {
        check_range(offset, length, self.length())?;
        if dst.remaining_mut() < length {
            return Err(MemoryError::invalid_range(0, length, dst.remaining_mut()));
        }
        let mut scratch = [0u8; STAGING_CHUNK];
        let mut done = 0;
        while done < length {
            let n = (length - done).min(STAGING_CHUNK);
            self.get_bytes(offset + done, &mut scratch[..n])?;
            dst.put_slice(&scratch[..n]);
            done += n;
        }
        Ok(())
    }

    /// Copy `length` bytes from an external buffer into this memory at
    /// `offset`, advancing the buffer.
    fn put_buf<B: Buf>(&self, offset: usize, src: &mut B, length: usize) -> MemoryResult<()>
    where
        Self: Sized,
    {
        check_range(offset, length, self.length())?;
        if src.remaining() < length {
            return Err(MemoryError::invalid_range(0, length, src.remaining()));
        }
        let mut done = 0;
        while done < length {
            let chunk = src.chunk();
            let n = chunk.len().min(length - done);
            self.put_bytes(offset + done, &chunk[..n])?;
            src.advance(n);
            done += n;
        }
        Ok(())
    }

    /// Typed view of `count` elements of `T` starting at byte `start`
    fn typed_array<T: Primitive>(
        &self,
        start: usize,
        count: usize,
    ) -> MemoryResult<TypedArray<Self, T>>
    where
        Self: Sized,
    {
        TypedArray::new(self, start, count)
    }

    fn byte_array(&self, start: usize, count: usize) -> MemoryResult<ByteArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }

    fn short_array(&self, start: usize, count: usize) -> MemoryResult<ShortArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }

    fn char_array(&self, start: usize, count: usize) -> MemoryResult<CharArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }

    fn int_array(&self, start: usize, count: usize) -> MemoryResult<IntArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }

    fn long_array(&self, start: usize, count: usize) -> MemoryResult<LongArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }

    fn float_array(&self, start: usize, count: usize) -> MemoryResult<FloatArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }

    fn double_array(&self, start: usize, count: usize) -> MemoryResult<DoubleArray<Self>>
    where
        Self: Sized,
    {
        self.typed_array(start, count)
    }
}

/// Owner of a memory region with an explicit release step
///
/// Implemented by [`HeapBuffer`], [`MMapBuffer`](crate::MMapBuffer) and
/// [`NativeBuffer`](crate::NativeBuffer). Native owners also release on drop,
/// but only `close` reports failures.
pub trait BufferResource {
    /// View type handed out by [`memory`](BufferResource::memory)
    type View<'a>: Memory
    where
        Self: 'a;

    /// View over the whole owned region
    fn memory(&self) -> Self::View<'_>;

    /// Release the region. Calling it again is a no-op.
    fn close(&mut self) -> MemoryResult<()>;
}
