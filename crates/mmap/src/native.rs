//! Anonymous growable off-heap buffers
//!
//! A [`NativeBuffer`] owns one region allocated by one of two strategies,
//! picked by [`NativeBufferConfig::mmap_threshold`]:
//!
//! - below the threshold: `malloc`, released with `free`
//! - at or above it: a private anonymous mapping (or `/dev/zero`), released
//!   with `munmap`
//!
//! [`realloc`](NativeBuffer::realloc) keeps the contents up to the smaller
//! of the old and new lengths. It resizes in place with `realloc` or
//! `mremap` when both sides use the same strategy, and otherwise allocates a
//! new region, copies, and releases the old one. Newly exposed bytes are
//! zero.

use std::fmt;
use std::io;
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use crate::config::{MmapConfig, NativeBufferConfig};
use crate::error::{MemoryError, MemoryResult};
use crate::memory::{BufferResource, DirectMemory, check_range};
use crate::order::ByteOrder;
use crate::syscalls;

/// Strategy that produced the current region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allocation {
    /// Zero length, nothing to release
    Empty,
    Malloc,
    Mapped,
}

/// Owner of one anonymous native region
///
/// Growth and close take `&mut self`, so no [`DirectMemory`] view can
/// survive them. Dropping an open buffer releases it on a best-effort basis.
pub struct NativeBuffer {
    ptr: Option<NonNull<u8>>,
    len: usize,
    order: ByteOrder,
    allocation: Allocation,
    config: NativeBufferConfig,
    closed: bool,
}

// SAFETY: the buffer exclusively owns its region; views borrow it. Not `Sync`
// because views write through `&self`.
unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
    /// Zero-filled buffer of `len` bytes using the process configuration
    pub fn new(len: usize, order: ByteOrder) -> MemoryResult<Self> {
        Self::with_config(len, order, MmapConfig::global().native)
    }

    pub fn with_config(
        len: usize,
        order: ByteOrder,
        config: NativeBufferConfig,
    ) -> MemoryResult<Self> {
        config.validate()?;
        let (ptr, allocation) = allocate(&config, len)?;
        debug!(length = len, mmapped = allocation == Allocation::Mapped, "allocated native buffer");
        Ok(Self {
            ptr,
            len,
            order,
            allocation,
            config,
            closed: false,
        })
    }

    /// View over the whole region; empty when the buffer is empty or closed
    pub fn memory(&self) -> DirectMemory<'_> {
        match self.ptr {
            // SAFETY: the region covers `len` writable bytes and is not
            // resized or released while `self` is borrowed.
            Some(ptr) => unsafe { DirectMemory::from_raw_parts(ptr, self.len, self.order, true) },
            None => DirectMemory::empty(self.order),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Whether the region is an anonymous mapping rather than a malloc block
    pub fn is_mmapped(&self) -> bool {
        self.allocation == Allocation::Mapped
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &NativeBufferConfig {
        &self.config
    }

    /// Resize to `new_len` bytes, keeping the first `min(old, new)` bytes.
    ///
    /// On failure the buffer keeps its old region and contents. Resizing to
    /// zero releases the region.
    pub fn realloc(&mut self, new_len: usize) -> MemoryResult<()> {
        if self.closed {
            return Err(MemoryError::invalid_state("realloc on a closed native buffer"));
        }
        if new_len == self.len {
            return Ok(());
        }
        let old_len = self.len;

        let Some(ptr) = self.ptr else {
            let (ptr, allocation) = allocate(&self.config, new_len)?;
            self.install(ptr, new_len, allocation);
            return Ok(());
        };

        if new_len == 0 {
            self.release_current()?;
            self.install(None, 0, Allocation::Empty);
            return Ok(());
        }

        let wants_mmap = self.config.uses_mmap(new_len);
        match (self.allocation, wants_mmap) {
            (Allocation::Malloc, false) => {
                // SAFETY: ptr is this buffer's live malloc block; `&mut self`
                // proves no view is alive.
                let grown = unsafe { syscalls::realloc(ptr, new_len) }
                    .ok_or_else(|| MemoryError::out_of_memory("realloc", new_len))?;
                if new_len > old_len {
                    // SAFETY: the block now spans new_len bytes.
                    unsafe { ptr::write_bytes(grown.as_ptr().add(old_len), 0, new_len - old_len) };
                }
                self.install(Some(grown), new_len, Allocation::Malloc);
            }
            (Allocation::Mapped, true) if self.config.capabilities.remap => {
                // SAFETY: ptr/old_len describe this buffer's live mapping.
                let moved = unsafe { syscalls::remap(ptr, old_len, new_len) }
                    .map_err(|e| map_error("mremap", new_len, &e))?;
                self.install(Some(moved), new_len, Allocation::Mapped);
            }
            _ => self.replace(ptr, new_len)?,
        }

        debug!(
            from = old_len,
            to = new_len,
            mmapped = self.is_mmapped(),
            "resized native buffer"
        );
        Ok(())
    }

    /// Allocate a fresh region, copy the common prefix, release the old one.
    fn replace(&mut self, old: NonNull<u8>, new_len: usize) -> MemoryResult<()> {
        let (fresh, allocation) = allocate(&self.config, new_len)?;
        if let Some(fresh) = fresh {
            // SAFETY: both regions are live, distinct and at least
            // min(old, new) bytes long.
            unsafe {
                ptr::copy_nonoverlapping(old.as_ptr(), fresh.as_ptr(), self.len.min(new_len));
            }
        }
        if let Err(err) = self.release_current() {
            warn!(length = self.len, error = %err, "failed to release replaced region");
        }
        self.install(fresh, new_len, allocation);
        Ok(())
    }

    fn install(&mut self, ptr: Option<NonNull<u8>>, len: usize, allocation: Allocation) {
        self.ptr = ptr;
        self.len = len;
        self.allocation = allocation;
    }

    /// Free the current region with the call matching its strategy.
    fn release_current(&mut self) -> MemoryResult<()> {
        let Some(ptr) = self.ptr.take() else {
            return Ok(());
        };
        let allocation = self.allocation;
        self.allocation = Allocation::Empty;
        // SAFETY: ptr/len/allocation describe the region this buffer owns,
        // which is no longer reachable through `self`.
        unsafe { release(ptr, self.len, allocation) }
            .map_err(|e| MemoryError::from_os("munmap", format!("anonymous, {}", self.len), &e))
    }

    fn page_range(
        &self,
        position: usize,
        length: usize,
    ) -> MemoryResult<Option<(NonNull<u8>, usize)>> {
        if self.closed {
            return Err(MemoryError::invalid_state("native buffer is closed"));
        }
        check_range(position, length, self.len)?;
        let Some(ptr) = self.ptr else {
            return Ok(None);
        };
        if length == 0 {
            return Ok(None);
        }
        let first = ptr.as_ptr() as usize + position;
        let (start, span) = syscalls::page_span(first, length, self.config.capabilities.page_size);
        // mlock accepts whole pages around a malloc block
        let addr = ptr.as_ptr().wrapping_add(position).wrapping_sub(first - start);
        Ok(NonNull::new(addr).map(|addr| (addr, span)))
    }

    /// Lock the pages covering `[position, position + length)` into RAM.
    pub fn pin(&self, position: usize, length: usize) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        // SAFETY: the span covers pages of this buffer's live region.
        syscalls::retry_on_again(|| unsafe { syscalls::memory_lock(addr, span) })
            .map_err(|e| syscalls::lock_error("mlock", format!("anonymous, {span}"), span, &e))
    }

    pub fn unpin(&self, position: usize, length: usize) -> MemoryResult<()> {
        let Some((addr, span)) = self.page_range(position, length)? else {
            return Ok(());
        };
        // SAFETY: the span covers pages of this buffer's live region.
        syscalls::retry_on_again(|| unsafe { syscalls::memory_unlock(addr, span) })
            .map_err(|e| syscalls::lock_error("munlock", format!("anonymous, {span}"), span, &e))
    }

    /// Release the region. A second call does nothing.
    pub fn close(&mut self) -> MemoryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let length = self.len;
        let result = self.release_current();
        self.install(None, 0, Allocation::Empty);
        debug!(length, "released native buffer");
        result
    }
}

fn map_error(operation: &'static str, len: usize, err: &io::Error) -> MemoryError {
    match err.raw_os_error() {
        Some(libc::ENOMEM) => MemoryError::out_of_memory(operation, len),
        _ => MemoryError::from_os(operation, format!("anonymous, {len}"), err),
    }
}

/// Zero-filled region of `len` bytes chosen by the configured strategy
fn allocate(
    config: &NativeBufferConfig,
    len: usize,
) -> MemoryResult<(Option<NonNull<u8>>, Allocation)> {
    if len == 0 {
        return Ok((None, Allocation::Empty));
    }
    if config.uses_mmap(len) {
        let mapped = if config.uses_dev_zero() {
            syscalls::map_dev_zero(len)
        } else {
            syscalls::map_anonymous(len)
        };
        let ptr = mapped.map_err(|e| map_error("mmap", len, &e))?;
        return Ok((Some(ptr), Allocation::Mapped));
    }
    let ptr = syscalls::malloc(len).ok_or_else(|| MemoryError::out_of_memory("malloc", len))?;
    // SAFETY: malloc returned `len` writable bytes.
    unsafe { ptr::write_bytes(ptr.as_ptr(), 0, len) };
    Ok((Some(ptr), Allocation::Malloc))
}

/// # Safety
///
/// `ptr`/`len` must describe a live region created with `allocation`.
unsafe fn release(ptr: NonNull<u8>, len: usize, allocation: Allocation) -> io::Result<()> {
    match allocation {
        Allocation::Empty => Ok(()),
        Allocation::Malloc => {
            // SAFETY: forwarded caller contract.
            unsafe { syscalls::free(ptr) };
            Ok(())
        }
        // SAFETY: forwarded caller contract.
        Allocation::Mapped => unsafe { syscalls::unmap(ptr, len) },
    }
}

impl BufferResource for NativeBuffer {
    type View<'a> = DirectMemory<'a>;

    fn memory(&self) -> DirectMemory<'_> {
        NativeBuffer::memory(self)
    }

    fn close(&mut self) -> MemoryResult<()> {
        NativeBuffer::close(self)
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to release native buffer on drop");
        }
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("length", &self.len)
            .field("order", &self.order)
            .field("allocation", &self.allocation)
            .field("closed", &self.closed)
            .finish()
    }
}
