//! File-backed memory mappings
//!
//! An [`MMapBuffer`] owns exactly one shared mapping of a file region. The
//! descriptor used to create it is closed right after `mmap` succeeds; the
//! mapping keeps the pages valid on its own.
//!
//! # Hazard
//!
//! Truncating the file from outside the process while a mapping is being
//! read raises `SIGBUS`. This layer does not catch it.

mod tracking;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, warn};

pub use self::tracking::{
    BroadcastSummary, is_tracking_enabled, set_tracking_enabled, tracked_mappings,
};
use self::tracking::MappingHandle;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::{BufferResource, DirectMemory, check_range};
use crate::order::ByteOrder;
use crate::syscalls::{self, Advice, Protection};

/// Access mode of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Pages are readable; writes through the view are rejected
    ReadOnly,
    /// Pages are readable and writable; writes reach the file
    ReadWrite,
}

impl MapMode {
    fn protection(self) -> Protection {
        match self {
            Self::ReadOnly => Protection::ReadOnly,
            Self::ReadWrite => Protection::ReadWrite,
        }
    }
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("READ_ONLY"),
            Self::ReadWrite => f.write_str("READ_WRITE"),
        }
    }
}

/// Owner of one file-backed mapping
///
/// Mutated only through its [`memory`](MMapBuffer::memory) view. Must be
/// released with [`close`](MMapBuffer::close); dropping an open buffer
/// unmaps on a best-effort basis and logs failures.
///
/// The buffer can move between threads but cannot be shared between them.
pub struct MMapBuffer {
    /// Page-aligned mapping; `None` when empty or closed
    mapping: Option<Arc<MappingHandle>>,
    /// First byte of the requested region inside the mapping
    base: NonNull<u8>,
    len: usize,
    order: ByteOrder,
    mode: MapMode,
    path: PathBuf,
    tracking_id: Option<u64>,
    closed: bool,
}

// SAFETY: the buffer exclusively owns its mapping. Views borrow the buffer,
// so none can outlive a move to another thread. Not `Sync`: views permit
// unsynchronized writes through `&self`.
unsafe impl Send for MMapBuffer {}

impl MMapBuffer {
    /// Map a whole file.
    ///
    /// A missing file is an error in [`MapMode::ReadOnly`] and is created
    /// empty in [`MapMode::ReadWrite`].
    pub fn open(path: impl AsRef<Path>, mode: MapMode, order: ByteOrder) -> MemoryResult<Self> {
        let path = path.as_ref();
        let file = open_file(path, mode)?;
        let file_len = file_length(&file, path)?;
        let length = usize::try_from(file_len).map_err(|_| {
            MemoryError::invalid_argument(format!(
                "{} is too large to map ({file_len} bytes)",
                path.display()
            ))
        })?;
        Self::from_file(&file, path, 0, length, mode, order)
    }

    /// Map `length` bytes of a file starting at byte `offset`.
    ///
    /// In [`MapMode::ReadWrite`] a shorter file is extended to
    /// `offset + length`; in [`MapMode::ReadOnly`] it is an error.
    pub fn open_range(
        path: impl AsRef<Path>,
        offset: u64,
        length: usize,
        mode: MapMode,
        order: ByteOrder,
    ) -> MemoryResult<Self> {
        let path = path.as_ref();
        let file = open_file(path, mode)?;
        // the descriptor closes when `file` drops
        Self::from_file(&file, path, offset, length, mode, order)
    }

    /// Map a region of an already open file.
    ///
    /// The descriptor stays owned by the caller. `path` is used for
    /// diagnostics only.
    pub fn from_file(
        file: &File,
        path: impl AsRef<Path>,
        offset: u64,
        length: usize,
        mode: MapMode,
        order: ByteOrder,
    ) -> MemoryResult<Self> {
        let path = path.as_ref();
        // nothing to map, so the file is neither checked nor extended
        if length == 0 {
            return Ok(Self::empty(path, order, mode));
        }

        let end = offset
            .checked_add(length as u64)
            .ok_or_else(|| MemoryError::invalid_argument("offset + length overflows"))?;
        let file_len = file_length(file, path)?;
        if file_len < end {
            match mode {
                MapMode::ReadOnly => {
                    return Err(MemoryError::invalid_argument(format!(
                        "{} is {file_len} bytes, cannot map {length} bytes at {offset} read-only",
                        path.display()
                    )));
                }
                MapMode::ReadWrite => {
                    file.set_len(end).map_err(|e| {
                        MemoryError::io(format!("extend {} to {end} bytes", path.display()), e)
                    })?;
                    debug!(path = %path.display(), from = file_len, to = end, "extended file");
                }
            }
        }

        let page = syscalls::page_size() as u64;
        let aligned = offset & !(page - 1);
        let delta = (offset - aligned) as usize;
        let map_len = length + delta;

        let addr = syscalls::map_file(file.as_raw_fd(), aligned, map_len, mode.protection())
            .map_err(|e| {
                MemoryError::from_os(
                    "mmap",
                    format!("{}, {offset}, {length}, {mode}", path.display()),
                    &e,
                )
            })?;
        // SAFETY: delta < page <= map_len, inside the new mapping.
        let base = unsafe { addr.add(delta) };

        let handle = Arc::new(MappingHandle { addr, len: map_len });
        let tracking_id = tracking::register(&handle);
        debug!(path = %path.display(), offset, length, %mode, "mapped file");

        Ok(Self {
            mapping: Some(handle),
            base,
            len: length,
            order,
            mode,
            path: path.to_path_buf(),
            tracking_id,
            closed: false,
        })
    }

    fn empty(path: &Path, order: ByteOrder, mode: MapMode) -> Self {
        Self {
            mapping: None,
            base: NonNull::dangling(),
            len: 0,
            order,
            mode,
            path: path.to_path_buf(),
            tracking_id: None,
            closed: false,
        }
    }

    /// View over the mapped bytes; empty once closed
    pub fn memory(&self) -> DirectMemory<'_> {
        if self.mapping.is_none() {
            return DirectMemory::empty(self.order);
        }
        // SAFETY: the mapping covers `len` bytes from `base` and stays mapped
        // while `self` is borrowed; writable only for READ_WRITE mappings.
        unsafe {
            DirectMemory::from_raw_parts(
                self.base,
                self.len,
                self.order,
                self.mode == MapMode::ReadWrite,
            )
        }
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether this mapping is in the tracking registry
    pub fn is_tracked(&self) -> bool {
        self.tracking_id.is_some_and(tracking::is_registered)
    }

    fn target(&self, position: usize, length: usize) -> String {
        format!("{}, {position}, {length}", self.path.display())
    }

    /// Whole-page span of `[position, position + length)`, or `None` for an
    /// empty request.
    fn page_range(
        &self,
        position: usize,
        length: usize,
    ) -> MemoryResult<Option<(NonNull<u8>, usize)>> {
        if self.closed {
            return Err(MemoryError::invalid_state(format!(
                "{} is closed",
                self.path.display()
            )));
        }
        check_range(position, length, self.len)?;
        let Some(mapping) = &self.mapping else {
            return Ok(None);
        };
        if length == 0 {
            return Ok(None);
        }
        let page = syscalls::page_size();
        let mapping_start = mapping.addr.as_ptr() as usize;
        let first = self.base.as_ptr() as usize + position;
        let (start, span) = syscalls::page_span(first, length, page);
        // SAFETY: the mapping start is page aligned and precedes `first`, so
        // `start` lies inside the mapping.
        let addr = unsafe { mapping.addr.add(start - mapping_start) };
        Ok(Some((addr, span)))
    }

    /// Write `[position, position + length)` back to the file, blocking
    /// until done.
    pub fn flush(&self, position: usize, length: usize) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        // SAFETY: page_range returns a span inside the live mapping.
        unsafe { syscalls::memory_sync(addr, span) }
            .map_err(|e| MemoryError::from_os("msync", self.target(position, length), &e))
    }

    /// Hint that `[position, position + length)` will be needed soon.
    ///
    /// Advisory only, and can be slow on large ranges.
    pub fn advise(&self, position: usize, length: usize) -> MemoryResult<()> {
        self.advise_with(position, length, Advice::WillNeed)
    }

    pub fn advise_with(&self, position: usize, length: usize, advice: Advice) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        // SAFETY: page_range returns a span inside the live mapping.
        unsafe { syscalls::memory_advise(addr, span, advice) }
            .map_err(|e| MemoryError::from_os("madvise", self.target(position, length), &e))
    }

    /// Lock the pages of `[position, position + length)` into RAM.
    pub fn pin(&self, position: usize, length: usize) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        // SAFETY: page_range returns a span inside the live mapping.
        syscalls::retry_on_again(|| unsafe { syscalls::memory_lock(addr, span) })
            .map_err(|e| syscalls::lock_error("mlock", self.target(position, length), span, &e))
    }

    pub fn unpin(&self, position: usize, length: usize) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        // SAFETY: page_range returns a span inside the live mapping.
        syscalls::retry_on_again(|| unsafe { syscalls::memory_unlock(addr, span) })
            .map_err(|e| syscalls::lock_error("munlock", self.target(position, length), span, &e))
    }

    /// Page residency of `[position, position + length)`, one byte per page
    /// written to `out` (bit 0 set when resident).
    pub fn mincore(&self, position: usize, length: usize, out: &mut [u8]) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        let pages = span / syscalls::page_size();
        if out.len() < pages {
            return Err(MemoryError::invalid_argument(format!(
                "mincore needs {pages} bytes of output, got {}",
                out.len()
            )));
        }
        // SAFETY: span is inside the live mapping and `out` holds one byte
        // per page.
        syscalls::retry_on_again(|| unsafe { syscalls::memory_residency(addr, span, out) })
            .map_err(|e| MemoryError::from_os("mincore", self.target(position, length), &e))
    }

    /// Whether each page of `[position, position + length)` is resident
    pub fn resident_pages(&self, position: usize, length: usize) -> MemoryResult<Vec<bool>> {
        let Some((_, span)) = self.page_range(position, length)? else {
            return Ok(Vec::new());
        };
        let mut out = vec![0u8; span / syscalls::page_size()];
        self.mincore(position, length, &mut out)?;
        Ok(out.into_iter().map(|b| b & 1 != 0).collect())
    }

    /// Advise "don't need" on every mapping in the tracking registry
    pub fn advise_dont_need_tracked() -> BroadcastSummary {
        tracking::advise_dont_need_all()
    }

    /// Unmap. A second call, or a call on an empty mapping, does nothing.
    pub fn close(&mut self) -> MemoryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(id) = self.tracking_id.take() {
            tracking::deregister(id);
        }
        let Some(mapping) = self.mapping.take() else {
            return Ok(());
        };
        // SAFETY: the handle describes the mapping created in from_file, it
        // is no longer tracked, and `&mut self` proves no view is alive.
        unsafe { syscalls::unmap(mapping.addr, mapping.len) }.map_err(|e| {
            MemoryError::from_os(
                "munmap",
                format!("{}, {}", self.path.display(), mapping.len),
                &e,
            )
        })?;
        debug!(path = %self.path.display(), length = self.len, "unmapped file");
        Ok(())
    }
}

impl BufferResource for MMapBuffer {
    type View<'a> = DirectMemory<'a>;

    fn memory(&self) -> DirectMemory<'_> {
        MMapBuffer::memory(self)
    }

    fn close(&mut self) -> MemoryResult<()> {
        MMapBuffer::close(self)
    }
}

impl Drop for MMapBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to unmap on drop");
        }
    }
}

impl fmt::Debug for MMapBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MMapBuffer")
            .field("path", &self.path)
            .field("length", &self.len)
            .field("order", &self.order)
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .finish()
    }
}

fn open_file(path: &Path, mode: MapMode) -> MemoryResult<File> {
    let result = match mode {
        MapMode::ReadOnly => File::open(path),
        MapMode::ReadWrite => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path),
    };
    result.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => MemoryError::not_found(path),
        _ => MemoryError::io(format!("open {}", path.display()), e),
    })
}

fn file_length(file: &File, path: &Path) -> MemoryResult<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| MemoryError::io(format!("stat {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::memory::Memory;

    #[test]
    fn test_read_only_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing");
        let err = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::native()).unwrap_err();
        assert!(matches!(err, MemoryError::NotFound { .. }));
    }

    #[test]
    fn test_read_write_extends_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grow.bin");
        let mut buffer =
            MMapBuffer::open_range(&path, 0, 10_000, MapMode::ReadWrite, ByteOrder::BigEndian)
                .unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10_000);
        buffer.memory().put_i64(9_992, -1).unwrap();
        buffer.close().unwrap();
        assert!(buffer.is_closed());
    }

    #[test]
    fn test_read_only_short_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let err = MMapBuffer::open_range(&path, 8, 16, MapMode::ReadOnly, ByteOrder::native())
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument { .. }));
    }

    #[test]
    fn test_zero_length_mapping_close_twice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        let mut buffer = MMapBuffer::open(&path, MapMode::ReadWrite, ByteOrder::native()).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.memory().length(), 0);
        buffer.flush(0, 0).unwrap();
        buffer.close().unwrap();
        buffer.close().unwrap();
    }

    #[test]
    fn test_unaligned_offset_maps_requested_byte() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(3 * 4096).collect();
        std::fs::write(&path, &bytes).unwrap();

        let buffer =
            MMapBuffer::open_range(&path, 4097, 100, MapMode::ReadOnly, ByteOrder::native())
                .unwrap();
        assert_eq!(buffer.memory().get_u8(0).unwrap(), bytes[4097]);
        assert_eq!(buffer.memory().to_vec(), bytes[4097..4197].to_vec());
    }

    #[test]
    fn test_read_only_view_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.bin");
        std::fs::write(&path, [7u8; 64]).unwrap();
        let buffer = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::native()).unwrap();
        let memory = buffer.memory();
        assert!(!memory.is_writable());
        assert!(matches!(memory.put_u8(0, 1), Err(MemoryError::ReadOnly { .. })));
        assert_eq!(memory.get_u8(63).unwrap(), 7);
    }

    #[test]
    fn test_advise_pin_and_residency() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hot.bin");
        let page = syscalls::page_size();
        let buffer =
            MMapBuffer::open_range(&path, 0, 4 * page, MapMode::ReadWrite, ByteOrder::native())
                .unwrap();
        buffer.memory().put_bytes(0, &vec![1u8; 4 * page]).unwrap();

        buffer.advise(0, 4 * page).unwrap();
        buffer.advise_with(page, 1, Advice::Random).unwrap();
        let resident = buffer.resident_pages(0, 4 * page).unwrap();
        assert_eq!(resident.len(), 4);
        assert!(resident[0]);

        // small ranges fit the default RLIMIT_MEMLOCK
        match buffer.pin(0, 1) {
            Ok(()) => buffer.unpin(0, 1).unwrap(),
            Err(err) => assert!(matches!(
                err,
                MemoryError::OutOfMemory { .. } | MemoryError::Syscall { .. }
            )),
        }

        let mut short = [0u8; 1];
        assert!(buffer.mincore(0, 2 * page, &mut short).is_err());
        assert!(buffer.flush(0, 5 * page).unwrap_err().is_bounds_violation());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("closed.bin");
        let mut buffer =
            MMapBuffer::open_range(&path, 0, 128, MapMode::ReadWrite, ByteOrder::native()).unwrap();
        buffer.close().unwrap();
        assert_eq!(buffer.memory().length(), 0);
        assert!(matches!(buffer.flush(0, 1), Err(MemoryError::InvalidState { .. })));
    }
}
