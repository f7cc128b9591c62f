//! The same access contract checked against every kind of backing.

use nebula_mmap::prelude::*;
use nebula_mmap::{MemoryError, NativeBufferConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Backing {
    Heap,
    Malloc,
    Anonymous,
    Mapped,
}

const LEN: usize = 4096;

/// Element type of a typed view
#[derive(Debug, Clone, Copy)]
enum Element {
    Byte,
    Short,
    Int,
    Long,
    Double,
}

impl Element {
    const fn size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Int => 4,
            Self::Long | Self::Double => 8,
        }
    }
}

/// Run `check` against a fresh zeroed memory of `LEN` bytes.
fn with_memory(backing: Backing, order: ByteOrder, check: impl Fn(&dyn Checked)) {
    match backing {
        Backing::Heap => check(&HeapMemory::new(LEN, order)),
        Backing::Malloc | Backing::Anonymous => {
            let threshold = if matches!(backing, Backing::Malloc) { LEN * 2 } else { LEN };
            let config = NativeBufferConfig::new().with_mmap_threshold(threshold);
            let mut buffer = NativeBuffer::with_config(LEN, order, config).unwrap();
            assert_eq!(buffer.is_mmapped(), matches!(backing, Backing::Anonymous));
            check(&buffer.memory());
            buffer.close().unwrap();
        }
        Backing::Mapped => {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("backing.bin");
            let mut buffer =
                MMapBuffer::open_range(&path, 0, LEN, MapMode::ReadWrite, order).unwrap();
            check(&buffer.memory());
            buffer.close().unwrap();
        }
    }
}

/// Object-safe bundle of what the checks need from a view
trait Checked {
    fn memory(&self) -> &dyn Memory;
    fn int_slice(&self, start: usize, count: usize) -> MemoryResult<Vec<i32>>;
    fn write_ints(&self, start: usize, values: &[i32]) -> MemoryResult<()>;
    fn subslice_put(&self, start: usize, at: usize, value: i64) -> MemoryResult<()>;
    /// Build a typed view, read its last element and return the error from
    /// reading one past the end.
    fn typed_edges(
        &self,
        element: Element,
        start: usize,
        count: usize,
    ) -> MemoryResult<MemoryError>;
}

/// Last element readable, one past the end rejected
macro_rules! edges {
    ($array:expr) => {{
        let array = $array?;
        if !array.is_empty() {
            array.get(array.len() - 1)?;
        }
        Ok(array.get(array.len()).unwrap_err())
    }};
}

impl<M: Memory> Checked for M {
    fn memory(&self) -> &dyn Memory {
        self
    }

    fn int_slice(&self, start: usize, count: usize) -> MemoryResult<Vec<i32>> {
        self.int_array(start, count)?.to_vec()
    }

    fn write_ints(&self, start: usize, values: &[i32]) -> MemoryResult<()> {
        self.int_array(start, values.len())?.set_range(0, values)
    }

    fn subslice_put(&self, start: usize, at: usize, value: i64) -> MemoryResult<()> {
        self.slice(start, self.length() - start)?.put_i64(at, value)
    }

    fn typed_edges(
        &self,
        element: Element,
        start: usize,
        count: usize,
    ) -> MemoryResult<MemoryError> {
        match element {
            Element::Byte => edges!(self.byte_array(start, count)),
            Element::Short => edges!(self.short_array(start, count)),
            Element::Int => edges!(self.int_array(start, count)),
            Element::Long => edges!(self.long_array(start, count)),
            Element::Double => edges!(self.double_array(start, count)),
        }
    }
}

#[rstest]
fn scalar_round_trips(
    #[values(Backing::Heap, Backing::Malloc, Backing::Anonymous, Backing::Mapped)] backing: Backing,
    #[values(ByteOrder::BigEndian, ByteOrder::LittleEndian)] order: ByteOrder,
) {
    with_memory(backing, order, |view| {
        let memory = view.memory();
        assert_eq!(memory.length(), LEN);
        assert_eq!(memory.order(), order);

        memory.put_u8(0, 0xAB).unwrap();
        memory.put_i16(1, -2).unwrap();
        memory.put_u16(3, 0xBEEF).unwrap();
        memory.put_i32(5, i32::MIN).unwrap();
        memory.put_i64(9, 0x0102_0304_0506_0708).unwrap();
        memory.put_f32(17, -1.5).unwrap();
        memory.put_f64(21, f64::MAX).unwrap();
        memory.put_i8(LEN - 1, -7).unwrap();

        assert_eq!(memory.get_u8(0).unwrap(), 0xAB);
        assert_eq!(memory.get_i16(1).unwrap(), -2);
        assert_eq!(memory.get_u16(3).unwrap(), 0xBEEF);
        assert_eq!(memory.get_i32(5).unwrap(), i32::MIN);
        assert_eq!(memory.get_i64(9).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(memory.get_f32(17).unwrap(), -1.5);
        assert_eq!(memory.get_f64(21).unwrap(), f64::MAX);
        assert_eq!(memory.get_i8(LEN - 1).unwrap(), -7);

        let first = if order == ByteOrder::BigEndian { 0x01 } else { 0x08 };
        assert_eq!(memory.get_u8(9).unwrap(), first);
    });
}

#[rstest]
fn bounds_are_enforced(
    #[values(Backing::Heap, Backing::Malloc, Backing::Anonymous, Backing::Mapped)] backing: Backing,
) {
    with_memory(backing, ByteOrder::native(), |view| {
        let memory = view.memory();
        assert!(memory.get_i32(LEN - 3).unwrap_err().is_bounds_violation());
        assert!(memory.put_i64(LEN - 7, 1).unwrap_err().is_bounds_violation());
        assert!(memory.get_u8(LEN).is_err());
        assert!(memory.put_bytes(usize::MAX, &[1]).is_err());
        assert!(view.int_slice(LEN - 4, 2).is_err());
        assert!(matches!(
            view.int_slice(8, usize::MAX),
            Err(MemoryError::InvalidRange { .. })
        ));
    });
}

#[rstest]
fn typed_views_enforce_bounds(
    #[values(Backing::Heap, Backing::Malloc, Backing::Anonymous, Backing::Mapped)] backing: Backing,
    #[values(Element::Byte, Element::Short, Element::Int, Element::Long, Element::Double)]
    element: Element,
) {
    with_memory(backing, ByteOrder::native(), |view| {
        // a view that ends exactly at the end of the memory
        let count = 8;
        let start = LEN - count * element.size();
        let past_end = view.typed_edges(element, start, count).unwrap();
        assert!(past_end.is_bounds_violation());

        // one element more no longer fits
        let err = view.typed_edges(element, start, count + 1).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidRange { .. }));
        assert!(view.typed_edges(element, start + 1, count).unwrap_err().is_bounds_violation());

        // empty views are valid at the very end
        let empty = view.typed_edges(element, LEN, 0).unwrap();
        assert!(empty.is_bounds_violation());

        assert!(matches!(
            view.typed_edges(element, 0, usize::MAX),
            Err(MemoryError::InvalidRange { .. })
        ));
    });
}

#[rstest]
fn typed_arrays_and_slices_share_storage(
    #[values(Backing::Heap, Backing::Malloc, Backing::Anonymous, Backing::Mapped)] backing: Backing,
    #[values(ByteOrder::BigEndian, ByteOrder::LittleEndian)] order: ByteOrder,
) {
    with_memory(backing, order, |view| {
        view.write_ints(100, &[10, 20, 30]).unwrap();
        assert_eq!(view.memory().get_i32(104).unwrap(), 20);
        assert_eq!(view.int_slice(100, 3).unwrap(), vec![10, 20, 30]);

        view.subslice_put(1000, 8, -42).unwrap();
        assert_eq!(view.memory().get_i64(1008).unwrap(), -42);
    });
}

#[rstest]
fn copies_into_heap_mirror_bytes(
    #[values(Backing::Heap, Backing::Malloc, Backing::Anonymous, Backing::Mapped)] backing: Backing,
) {
    with_memory(backing, ByteOrder::BigEndian, |view| {
        let memory = view.memory();
        memory.put_i32(0, 0x0A0B_0C0D).unwrap();

        let heap = HeapMemory::new(8, ByteOrder::LittleEndian);
        memory.get_memory(0, &heap, 2, 4).unwrap();
        assert_eq!(heap.to_vec(), vec![0, 0, 0x0A, 0x0B, 0x0C, 0x0D, 0, 0]);

        // overlapping copy within the same memory
        memory.put_memory(1, memory, 0, 4).unwrap();
        let mut out = [0u8; 5];
        memory.get_bytes(0, &mut out).unwrap();
        assert_eq!(out, [0x0A, 0x0A, 0x0B, 0x0C, 0x0D]);
    });
}
