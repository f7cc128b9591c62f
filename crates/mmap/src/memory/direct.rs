//! Memory over a native address range

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::{Memory, Region, check_range, check_slice};
use crate::access::{DirectDataAccess, Primitive};
use crate::error::{MemoryError, MemoryResult};
use crate::order::ByteOrder;

/// [`Memory`] over a raw address range outside the Rust heap
///
/// Stores `(base, length)`; every access adds the logical offset to `base`
/// after a bounds check. The lifetime `'a` ties the view to the buffer that
/// owns the region, so growing or closing that buffer while a view is alive
/// does not compile.
///
/// A view of a read-only mapping rejects every write with
/// [`MemoryError::ReadOnly`].
#[derive(Clone, Copy)]
pub struct DirectMemory<'a> {
    base: NonNull<u8>,
    len: usize,
    order: ByteOrder,
    access: DirectDataAccess,
    writable: bool,
    _owner: PhantomData<&'a Cell<u8>>,
}

impl<'a> DirectMemory<'a> {
    /// View over `len` bytes at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` bytes for `'a`, and for writes
    /// as well when `writable` is true. Nothing else may hold a Rust reference
    /// into the range while the view is alive.
    pub unsafe fn from_raw_parts(
        base: NonNull<u8>,
        len: usize,
        order: ByteOrder,
        writable: bool,
    ) -> Self {
        Self {
            base,
            len,
            order,
            access: DirectDataAccess::for_order(order),
            writable,
            _owner: PhantomData,
        }
    }

    /// Zero-length view that performs no access
    pub fn empty(order: ByteOrder) -> Self {
        // SAFETY: a zero-length range is never dereferenced.
        unsafe { Self::from_raw_parts(NonNull::dangling(), 0, order, true) }
    }

    /// Writable view over a borrowed byte slice
    pub fn from_slice(bytes: &'a mut [u8], order: ByteOrder) -> Self {
        let len = bytes.len();
        let base = NonNull::from(bytes).cast::<u8>();
        // SAFETY: the exclusive borrow lasts for 'a and covers `len` bytes.
        unsafe { Self::from_raw_parts(base, len, order, true) }
    }

    /// Same range, scalars interpreted in `order`
    pub fn with_order(&self, order: ByteOrder) -> Self {
        Self {
            order,
            access: DirectDataAccess::for_order(order),
            ..*self
        }
    }

    /// Whether writes are permitted
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Copy of the visible bytes
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        // SAFETY: the view covers `len` readable bytes.
        unsafe { DirectDataAccess::copy_memory(self.base.as_ptr(), out.as_mut_ptr(), self.len) };
        out
    }

    #[inline]
    fn read<T: Primitive>(&self, offset: usize) -> MemoryResult<T> {
        check_range(offset, T::SIZE, self.len)?;
        // SAFETY: offset + T::SIZE <= len was just checked.
        Ok(unsafe { self.access.get(self.base.as_ptr().add(offset)) })
    }

    #[inline]
    fn write<T: Primitive>(&self, offset: usize, value: T) -> MemoryResult<()> {
        self.check_writable(offset, T::SIZE)?;
        // SAFETY: bounds and writability were just checked.
        unsafe { self.access.put(self.base.as_ptr().add(offset), value) };
        Ok(())
    }

    fn check_writable(&self, offset: usize, length: usize) -> MemoryResult<()> {
        check_range(offset, length, self.len)?;
        if self.writable {
            Ok(())
        } else {
            Err(MemoryError::ReadOnly { offset, length })
        }
    }
}

impl Memory for DirectMemory<'_> {
    fn length(&self) -> usize {
        self.len
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn order(&self) -> ByteOrder {
        self.order
    }

    memory_scalars! {
        get_u8, put_u8, u8;
        get_i16, put_i16, i16;
        get_u16, put_u16, u16;
        get_i32, put_i32, i32;
        get_i64, put_i64, i64;
        get_f32, put_f32, f32;
        get_f64, put_f64, f64;
    }

    fn get_bytes(&self, offset: usize, dst: &mut [u8]) -> MemoryResult<()> {
        check_range(offset, dst.len(), self.len)?;
        // SAFETY: source range checked; `dst` is an exclusive slice that
        // cannot alias a region reachable only through raw pointers.
        unsafe {
            DirectDataAccess::copy_memory(
                self.base.as_ptr().add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    fn put_bytes(&self, offset: usize, src: &[u8]) -> MemoryResult<()> {
        self.check_writable(offset, src.len())?;
        // SAFETY: destination range checked and writable.
        unsafe {
            DirectDataAccess::copy_memory(src.as_ptr(), self.base.as_ptr().add(offset), src.len());
        }
        Ok(())
    }

    fn region(&self) -> Region<'_> {
        Region::new(self.base.as_ptr(), self.len, self.writable)
    }

    fn slice(&self, start: usize, length: usize) -> MemoryResult<Self> {
        check_slice(start, length, self.len)?;
        // SAFETY: start <= len, so the result stays inside the region.
        let base = unsafe { self.base.add(start) };
        Ok(Self {
            base,
            len: length,
            ..*self
        })
    }
}

impl fmt::Debug for DirectMemory<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectMemory")
            .field("length", &self.len)
            .field("order", &self.order)
            .field("writable", &self.writable)
            .finish()
    }
}
