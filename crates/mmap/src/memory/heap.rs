//! Heap-backed memory

use core::cell::Cell;
use core::fmt;
use std::rc::Rc;

use super::{BufferResource, Memory, Region, check_range, check_slice};
use crate::access::{HeapDataAccess, Primitive};
use crate::error::MemoryResult;
use crate::order::ByteOrder;

/// [`Memory`] over a reference-counted heap array
///
/// Stores `(array, offset, length)`. Slices and clones share the array, so a
/// write through any of them is visible through all. Single-threaded: the
/// array is an `Rc<[Cell<u8>]>`.
#[derive(Clone)]
pub struct HeapMemory {
    data: Rc<[Cell<u8>]>,
    offset: usize,
    len: usize,
    order: ByteOrder,
    access: HeapDataAccess,
}

impl HeapMemory {
    /// Zero-filled memory of `len` bytes
    pub fn new(len: usize, order: ByteOrder) -> Self {
        let data: Rc<[Cell<u8>]> = (0..len).map(|_| Cell::new(0)).collect();
        Self::from_cells(data, order)
    }

    /// Take ownership of `bytes` as the backing array
    pub fn from_vec(bytes: Vec<u8>, order: ByteOrder) -> Self {
        let data: Rc<[Cell<u8>]> = bytes.into_iter().map(Cell::new).collect();
        Self::from_cells(data, order)
    }

    /// Copy `bytes` into a new backing array
    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Self {
        let data: Rc<[Cell<u8>]> = bytes.iter().copied().map(Cell::new).collect();
        Self::from_cells(data, order)
    }

    fn from_cells(data: Rc<[Cell<u8>]>, order: ByteOrder) -> Self {
        Self {
            len: data.len(),
            data,
            offset: 0,
            order,
            access: HeapDataAccess::for_order(order),
        }
    }

    /// Same storage and range, scalars interpreted in `order`
    pub fn with_order(&self, order: ByteOrder) -> Self {
        Self {
            order,
            access: HeapDataAccess::for_order(order),
            ..self.clone()
        }
    }

    /// Copy of the visible bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.cells().iter().map(Cell::get).collect()
    }

    fn cells(&self) -> &[Cell<u8>] {
        &self.data[self.offset..self.offset + self.len]
    }

    #[inline]
    fn read<T: Primitive>(&self, offset: usize) -> MemoryResult<T> {
        check_range(offset, T::SIZE, self.len)?;
        Ok(self.access.get(&self.data, self.offset + offset))
    }

    #[inline]
    fn write<T: Primitive>(&self, offset: usize, value: T) -> MemoryResult<()> {
        check_range(offset, T::SIZE, self.len)?;
        self.access.put(&self.data, self.offset + offset, value);
        Ok(())
    }
}

impl Memory for HeapMemory {
    fn length(&self) -> usize {
        self.len
    }

    fn is_direct(&self) -> bool {
        false
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
        for (byte, cell) in dst.iter_mut().zip(&self.cells()[offset..]) {
            *byte = cell.get();
        }
        Ok(())
    }

    fn put_bytes(&self, offset: usize, src: &[u8]) -> MemoryResult<()> {
        check_range(offset, src.len(), self.len)?;
        for (cell, byte) in self.cells()[offset..].iter().zip(src) {
            cell.set(*byte);
        }
        Ok(())
    }

    fn region(&self) -> Region<'_> {
        // Writes through a pointer derived from `&[Cell<u8>]` are permitted.
        let ptr = self.cells().as_ptr().cast::<u8>().cast_mut();
        Region::new(ptr, self.len, true)
    }

    fn slice(&self, start: usize, length: usize) -> MemoryResult<Self> {
        check_slice(start, length, self.len)?;
        Ok(Self {
            data: Rc::clone(&self.data),
            offset: self.offset + start,
            len: length,
            order: self.order,
            access: self.access,
        })
    }
}

impl fmt::Debug for HeapMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapMemory")
            .field("offset", &self.offset)
            .field("length", &self.len)
            .field("order", &self.order)
            .finish()
    }
}

/// Owned heap region with the same lifecycle surface as the native buffers
///
/// `close` releases nothing; the array is freed when the last view drops.
#[derive(Debug, Clone)]
pub struct HeapBuffer {
    memory: HeapMemory,
}

impl HeapBuffer {
    pub fn new(len: usize, order: ByteOrder) -> Self {
        Self {
            memory: HeapMemory::new(len, order),
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len
    }

    pub fn is_empty(&self) -> bool {
        self.memory.len == 0
    }
}

impl BufferResource for HeapBuffer {
    type View<'a> = HeapMemory;

    fn memory(&self) -> HeapMemory {
        self.memory.clone()
    }

    fn close(&mut self) -> MemoryResult<()> {
        Ok(())
    }
}
