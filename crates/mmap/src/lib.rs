//! # nebula-mmap
//!
//! Addressable byte-range memory with explicit byte order, over three kinds
//! of storage:
//! - heap arrays ([`HeapMemory`], [`HeapBuffer`])
//! - anonymous native regions that can grow ([`NativeBuffer`])
//! - memory-mapped files ([`MMapBuffer`])
//!
//! Every backing exposes the same [`Memory`] contract: typed scalar reads and
//! writes at byte offsets, bulk copies between any two memories, zero-copy
//! slices and typed array views ([`TypedArray`]). Sequential adapters in
//! [`io`] turn a memory into a `DataInput`, a `std::io` stream or a
//! scattering reader, and build growable outputs on native buffers
//! ([`ZeroCopyOutputStream`]) or on files ([`DynamicMMapWriter`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_mmap::prelude::*;
//!
//! let mut buffer = NativeBuffer::new(64, ByteOrder::BigEndian)?;
//! let memory = buffer.memory();
//! memory.put_i32(0, 0x0102_0304)?;
//! assert_eq!(memory.get_u8(0)?, 0x01);
//!
//! let ints = memory.int_array(4, 8)?;
//! ints.set(7, -1)?;
//! assert_eq!(memory.get_i32(4 + 7 * 4)?, -1);
//!
//! buffer.realloc(1024)?;
//! assert_eq!(buffer.memory().get_i32(0)?, 0x0102_0304);
//! buffer.close()?;
//! # Ok::<(), nebula_mmap::MemoryError>(())
//! ```
//!
//! ## Concurrency
//!
//! Views mutate through `&self` and are neither `Send` nor `Sync`. Owning
//! buffers may move between threads but are not shared; resizing and closing
//! take `&mut self`, so no view outlives the region it points into.
//!
//! ## Configuration
//!
//! [`MmapConfig::from_env`] reads `NEBULA_MMAP_THRESHOLD`,
//! `NEBULA_MMAP_DEV_ZERO` and `NEBULA_MMAP_TRACKING`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]
// Raw regions, libc calls and unaligned loads are the point of this crate
#![allow(unsafe_code)]

#[cfg(not(unix))]
compile_error!("nebula-mmap requires a unix target (mmap, madvise, mlock)");

// Error types
pub mod error;

pub mod access;
pub mod array;
pub mod config;
pub mod io;
pub mod mapped;
pub mod memory;
pub mod native;
pub mod order;
mod syscalls;

pub use crate::access::{DirectDataAccess, HeapDataAccess, Primitive};
pub use crate::array::{
    ByteArray, CharArray, DoubleArray, FloatArray, IntArray, LongArray, ShortArray, TypedArray,
};
pub use crate::config::{AnonymousSource, MmapConfig, NativeBufferConfig};
pub use crate::error::{MemoryError, MemoryResult};
pub use crate::io::{
    DataInput, DataOutput, DynamicMMapWriter, MemoryDataInput, MemoryInputStream,
    MemoryScatteringReader, ZeroCopyOutputStream,
};
pub use crate::mapped::{
    BroadcastSummary, MMapBuffer, MapMode, is_tracking_enabled, set_tracking_enabled,
    tracked_mappings,
};
pub use crate::memory::{BufferResource, DirectMemory, HeapBuffer, HeapMemory, Memory};
pub use crate::native::NativeBuffer;
pub use crate::order::ByteOrder;
pub use crate::syscalls::{Advice, Capabilities, page_size};

/// Common imports
pub mod prelude {
    pub use crate::array::TypedArray;
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::io::{
        DataInput, DataOutput, DynamicMMapWriter, MemoryDataInput, MemoryInputStream,
        ZeroCopyOutputStream,
    };
    pub use crate::mapped::{MMapBuffer, MapMode};
    pub use crate::memory::{BufferResource, DirectMemory, HeapBuffer, HeapMemory, Memory};
    pub use crate::native::NativeBuffer;
    pub use crate::order::ByteOrder;
}
