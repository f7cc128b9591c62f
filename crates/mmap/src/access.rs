//! Scalar data-access strategies
//!
//! Two families of stateless strategies, each with a native-order and a
//! reverse-order variant:
//!
//! - [`HeapDataAccess`] reads and writes scalars at an index of a heap byte
//!   array (a slice of `Cell<u8>` so that views can share it).
//! - [`DirectDataAccess`] reads and writes scalars at a raw address inside a
//!   native region.
//!
//! A memory view picks its variant once, at construction, from the requested
//! byte order. Single-byte scalars are never swapped.

use core::cell::Cell;
use core::fmt::Debug;
use core::ptr;

use crate::error::MemoryResult;
use crate::memory::Memory;
use crate::order::ByteOrder;

mod private {
    pub trait Sealed {}
}

/// Fixed-width scalar that can be stored in a memory range
///
/// Implemented for `u8`, `i8`, `i16`, `u16` (a UTF-16 code unit, the "char"
/// element), `i32`, `i64`, `f32` and `f64`. The trait is sealed: every bit
/// pattern of `SIZE` bytes must be a valid value.
pub trait Primitive: Copy + PartialEq + Debug + Default + private::Sealed + 'static {
    /// Width in bytes
    const SIZE: usize;

    /// Native-endian byte representation
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default + Copy;

    /// Reverse the byte order of the value
    fn swap_bytes(self) -> Self;

    /// Build a value from its native-endian bytes
    fn from_ne_bytes(bytes: Self::Bytes) -> Self;

    /// Native-endian bytes of the value
    fn to_ne_bytes(self) -> Self::Bytes;

    /// Read a value through the named accessor of `memory`
    fn load<M: Memory + ?Sized>(memory: &M, offset: usize) -> MemoryResult<Self>;

    /// Write a value through the named accessor of `memory`
    fn store<M: Memory + ?Sized>(self, memory: &M, offset: usize) -> MemoryResult<()>;
}

macro_rules! impl_primitive {
    ($ty:ty, $size:literal, $get:ident, $put:ident, |$v:ident| $swap:expr) => {
        impl private::Sealed for $ty {}

        impl Primitive for $ty {
            const SIZE: usize = $size;
            type Bytes = [u8; $size];

            #[inline(always)]
            fn swap_bytes(self) -> Self {
                let $v = self;
                $swap
            }

            #[inline(always)]
            fn from_ne_bytes(bytes: Self::Bytes) -> Self {
                <$ty>::from_ne_bytes(bytes)
            }

            #[inline(always)]
            fn to_ne_bytes(self) -> Self::Bytes {
                <$ty>::to_ne_bytes(self)
            }

            #[inline]
            fn load<M: Memory + ?Sized>(memory: &M, offset: usize) -> MemoryResult<Self> {
                memory.$get(offset)
            }

            #[inline]
            fn store<M: Memory + ?Sized>(self, memory: &M, offset: usize) -> MemoryResult<()> {
                memory.$put(offset, self)
            }
        }
    };
}

impl_primitive!(u8, 1, get_u8, put_u8, |v| v);
impl_primitive!(i8, 1, get_i8, put_i8, |v| v);
impl_primitive!(i16, 2, get_i16, put_i16, |v| v.swap_bytes());
impl_primitive!(u16, 2, get_u16, put_u16, |v| v.swap_bytes());
impl_primitive!(i32, 4, get_i32, put_i32, |v| v.swap_bytes());
impl_primitive!(i64, 8, get_i64, put_i64, |v| v.swap_bytes());
impl_primitive!(f32, 4, get_f32, put_f32, |v| f32::from_bits(v.to_bits().swap_bytes()));
impl_primitive!(f64, 8, get_f64, put_f64, |v| f64::from_bits(v.to_bits().swap_bytes()));

// ============================================================================
// Heap strategy
// ============================================================================

/// Scalar access at an index of a shared heap byte array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapDataAccess {
    /// Stored order equals host order
    NativeEndian,
    /// Stored order is the reverse of host order
    ReverseEndian,
}

impl HeapDataAccess {
    /// Strategy for data stored in `order`
    #[inline]
    pub const fn for_order(order: ByteOrder) -> Self {
        if order.is_native() {
            Self::NativeEndian
        } else {
            Self::ReverseEndian
        }
    }

    /// Read a `T` starting at `index`.
    ///
    /// Panics if `index + T::SIZE` exceeds `data.len()`; memory views check
    /// bounds before delegating here.
    #[inline]
    pub fn get<T: Primitive>(self, data: &[Cell<u8>], index: usize) -> T {
        let mut bytes = T::Bytes::default();
        for (dst, src) in bytes.as_mut().iter_mut().zip(&data[index..index + T::SIZE]) {
            *dst = src.get();
        }
        let value = T::from_ne_bytes(bytes);
        match self {
            Self::NativeEndian => value,
            Self::ReverseEndian => value.swap_bytes(),
        }
    }

    /// Write `value` starting at `index`.
    #[inline]
    pub fn put<T: Primitive>(self, data: &[Cell<u8>], index: usize, value: T) {
        let value = match self {
            Self::NativeEndian => value,
            Self::ReverseEndian => value.swap_bytes(),
        };
        let bytes = value.to_ne_bytes();
        for (dst, src) in data[index..index + T::SIZE].iter().zip(bytes.as_ref()) {
            dst.set(*src);
        }
    }
}

// ============================================================================
// Direct strategy
// ============================================================================

/// Scalar access at a raw address of a native region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectDataAccess {
    /// Stored order equals host order
    NativeEndian,
    /// Stored order is the reverse of host order
    ReverseEndian,
}

impl DirectDataAccess {
    /// Strategy for data stored in `order`
    #[inline]
    pub const fn for_order(order: ByteOrder) -> Self {
        if order.is_native() {
            Self::NativeEndian
        } else {
            Self::ReverseEndian
        }
    }

    /// Read a `T` at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for reads of `T::SIZE` bytes. No alignment is
    /// required.
    #[inline]
    pub unsafe fn get<T: Primitive>(self, addr: *const u8) -> T {
        // SAFETY: caller guarantees T::SIZE readable bytes; every bit pattern
        // is a valid T (sealed trait).
        let value = unsafe { addr.cast::<T>().read_unaligned() };
        match self {
            Self::NativeEndian => value,
            Self::ReverseEndian => value.swap_bytes(),
        }
    }

    /// Write `value` at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for writes of `T::SIZE` bytes and not aliased by
    /// a live Rust reference.
    #[inline]
    pub unsafe fn put<T: Primitive>(self, addr: *mut u8, value: T) {
        let value = match self {
            Self::NativeEndian => value,
            Self::ReverseEndian => value.swap_bytes(),
        };
        // SAFETY: caller guarantees T::SIZE writable bytes.
        unsafe { addr.cast::<T>().write_unaligned(value) };
    }

    /// Copy `len` raw bytes; the ranges may overlap.
    ///
    /// # Safety
    ///
    /// `src` must be readable and `dst` writable for `len` bytes.
    #[inline]
    pub unsafe fn copy_memory(src: *const u8, dst: *mut u8, len: usize) {
        if len > 0 {
            // SAFETY: forwarded caller contract; ptr::copy tolerates overlap.
            unsafe { ptr::copy(src, dst, len) };
        }
    }
}
