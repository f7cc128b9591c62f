//! Fixed-stride typed views over a `Memory`
//!
//! A [`TypedArray`] is `(backing memory, element count)` with the element
//! width fixed by its scalar type. It is created by slicing the backing
//! memory, so it shares storage with it and has no lifetime of its own.
//!
//! Bulk transfers between two arrays are a single byte copy scaled by the
//! element width. Like every bulk copy they mirror bytes: two arrays with
//! different declared byte orders exchange raw bytes, not values.

use core::fmt;
use core::marker::PhantomData;

use crate::access::Primitive;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::{Memory, check_range};

/// Index-addressed view of `len` elements of `T`
#[derive(Clone)]
pub struct TypedArray<M, T> {
    memory: M,
    len: usize,
    _element: PhantomData<T>,
}

/// `u8` elements
pub type ByteArray<M> = TypedArray<M, u8>;
/// `i16` elements
pub type ShortArray<M> = TypedArray<M, i16>;
/// UTF-16 code units
pub type CharArray<M> = TypedArray<M, u16>;
/// `i32` elements
pub type IntArray<M> = TypedArray<M, i32>;
/// `i64` elements
pub type LongArray<M> = TypedArray<M, i64>;
/// `f32` elements
pub type FloatArray<M> = TypedArray<M, f32>;
/// `f64` elements
pub type DoubleArray<M> = TypedArray<M, f64>;

impl<M: Memory, T: Primitive> TypedArray<M, T> {
    /// View `count` elements starting at byte `start` of `memory`.
    ///
    /// Fails with [`MemoryError::InvalidRange`] unless
    /// `start + count * size_of::<T>() <= memory.length()`.
    pub fn new(memory: &M, start: usize, count: usize) -> MemoryResult<Self> {
        let bytes = count
            .checked_mul(T::SIZE)
            .ok_or_else(|| MemoryError::invalid_range(start, usize::MAX, memory.length()))?;
        Ok(Self {
            memory: memory.slice(start, bytes)?,
            len: count,
            _element: PhantomData,
        })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Width of one element in bytes
    pub const fn element_size(&self) -> usize {
        T::SIZE
    }

    /// The byte range backing this view
    pub fn memory(&self) -> &M {
        &self.memory
    }

    fn byte_offset(&self, index: usize) -> MemoryResult<usize> {
        index
            .checked_mul(T::SIZE)
            .ok_or_else(|| MemoryError::out_of_bounds(index, T::SIZE, self.memory.length()))
    }

    fn byte_range(&self, index: usize, count: usize) -> MemoryResult<(usize, usize)> {
        let offset = self.byte_offset(index)?;
        let length = count
            .checked_mul(T::SIZE)
            .ok_or_else(|| MemoryError::out_of_bounds(offset, usize::MAX, self.memory.length()))?;
        check_range(offset, length, self.memory.length())?;
        Ok((offset, length))
    }

    pub fn get(&self, index: usize) -> MemoryResult<T> {
        T::load(&self.memory, self.byte_offset(index)?)
    }

    pub fn set(&self, index: usize, value: T) -> MemoryResult<()> {
        value.store(&self.memory, self.byte_offset(index)?)
    }

    /// Read `dst.len()` elements starting at `index`.
    pub fn get_range(&self, index: usize, dst: &mut [T]) -> MemoryResult<()> {
        let (offset, _) = self.byte_range(index, dst.len())?;
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = T::load(&self.memory, offset + i * T::SIZE)?;
        }
        Ok(())
    }

    /// Write all of `src` starting at `index`.
    pub fn set_range(&self, index: usize, src: &[T]) -> MemoryResult<()> {
        let (offset, _) = self.byte_range(index, src.len())?;
        for (i, value) in src.iter().enumerate() {
            value.store(&self.memory, offset + i * T::SIZE)?;
        }
        Ok(())
    }

    /// Copy `count` elements from `index` into `dst` at `dst_index`.
    ///
    /// `dst` may be backed by a different kind of memory.
    pub fn copy_to<N: Memory>(
        &self,
        index: usize,
        dst: &TypedArray<N, T>,
        dst_index: usize,
        count: usize,
    ) -> MemoryResult<()> {
        let (offset, length) = self.byte_range(index, count)?;
        let (dst_offset, _) = dst.byte_range(dst_index, count)?;
        self.memory.get_memory(offset, &dst.memory, dst_offset, length)
    }

    /// Copy `count` elements of `src` starting at `src_index` into this view
    /// at `index`.
    pub fn copy_from<N: Memory>(
        &self,
        index: usize,
        src: &TypedArray<N, T>,
        src_index: usize,
        count: usize,
    ) -> MemoryResult<()> {
        src.copy_to(src_index, self, index, count)
    }

    /// View of `count` elements starting at element `start`
    pub fn slice(&self, start: usize, count: usize) -> MemoryResult<Self> {
        let offset = start
            .checked_mul(T::SIZE)
            .ok_or_else(|| MemoryError::invalid_range(start, count, self.len))?;
        Self::new(&self.memory, offset, count)
    }

    /// All elements, in order
    pub fn to_vec(&self) -> MemoryResult<Vec<T>> {
        let mut out = vec![T::default(); self.len];
        self.get_range(0, &mut out)?;
        Ok(out)
    }
}

impl<M: Memory, T: Primitive> fmt::Debug for TypedArray<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedArray")
            .field("element", &core::any::type_name::<T>())
            .field("len", &self.len)
            .field("order", &self.memory.order())
            .finish()
    }
}
