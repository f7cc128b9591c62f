//! Direct libc wrappers for mapping, locking and allocation
//!
//! # Safety
//!
//! Functions that take an address are `unsafe`: callers must pass a range
//! obtained from the matching allocation call (`map_*` for the mapping
//! family, `malloc`/`realloc` for the heap family) and must not use it after
//! releasing it. Functions that only create a new region are safe; the OS
//! validates their parameters.
//!
//! Every failure is returned as `io::Error::last_os_error()` so the caller
//! can keep the raw errno.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr::{self, NonNull};

/// Page protection of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Protection {
    ReadOnly,
    ReadWrite,
}

impl Protection {
    fn to_unix_flags(self) -> libc::c_int {
        match self {
            Self::ReadOnly => libc::PROT_READ,
            Self::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        }
    }
}

/// Memory access pattern advice passed to `madvise`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Advice {
    /// No special treatment
    Normal,
    /// Expect random page references
    Random,
    /// Expect sequential page references
    Sequential,
    /// Expect access soon; the kernel may read ahead
    #[default]
    WillNeed,
    /// Pages are not needed soon; the kernel may drop them
    DontNeed,
}

impl Advice {
    fn to_unix_flags(self) -> libc::c_int {
        match self {
            Self::Normal => libc::MADV_NORMAL,
            Self::Random => libc::MADV_RANDOM,
            Self::Sequential => libc::MADV_SEQUENTIAL,
            Self::WillNeed => libc::MADV_WILLNEED,
            Self::DontNeed => libc::MADV_DONTNEED,
        }
    }
}

fn check_mapped(ptr: *mut libc::c_void) -> io::Result<NonNull<u8>> {
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))
}

fn check_status(result: libc::c_int) -> io::Result<()> {
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Map `len` bytes of the file behind `fd`, starting at the page-aligned
/// file `offset`, as a shared mapping.
pub(crate) fn map_file(
    fd: RawFd,
    offset: u64,
    len: usize,
    protection: Protection,
) -> io::Result<NonNull<u8>> {
    let offset = libc::off_t::try_from(offset)
        .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))?;

    // SAFETY: FFI call to mmap with a null hint. fd is an open descriptor
    // owned by the caller; the OS validates length, offset and flags and
    // returns MAP_FAILED on error.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            protection.to_unix_flags(),
            libc::MAP_SHARED,
            fd,
            offset,
        )
    };
    check_mapped(ptr)
}

/// Private zero-filled mapping of `len` bytes using the anonymous flag
pub(crate) fn map_anonymous(len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: FFI call to mmap without a file (fd=-1, offset=0).
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    check_mapped(ptr)
}

/// Private zero-filled mapping of `len` bytes backed by `/dev/zero`
///
/// Used where the anonymous flag is unavailable. The descriptor is closed
/// as soon as the mapping exists.
pub(crate) fn map_dev_zero(len: usize) -> io::Result<NonNull<u8>> {
    let zero = File::options().read(true).write(true).open("/dev/zero")?;
    // SAFETY: FFI call to mmap over an open /dev/zero descriptor; a private
    // mapping never writes back to the device.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE,
            zero.as_raw_fd(),
            0,
        )
    };
    check_mapped(ptr)
}

/// Unmap a mapping.
///
/// # Safety
///
/// `addr`/`len` must describe a live mapping returned by a `map_*` call.
/// The range must not be accessed afterwards.
pub(crate) unsafe fn unmap(addr: NonNull<u8>, len: usize) -> io::Result<()> {
    // SAFETY: caller guarantees addr/len came from mmap.
    check_status(unsafe { libc::munmap(addr.as_ptr().cast(), len) })
}

/// Resize a mapping, possibly moving it.
///
/// # Safety
///
/// `addr`/`old_len` must describe a live mapping. On success the old address
/// is invalid.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) unsafe fn remap(
    addr: NonNull<u8>,
    old_len: usize,
    new_len: usize,
) -> io::Result<NonNull<u8>> {
    // SAFETY: caller guarantees a live mapping; MREMAP_MAYMOVE lets the
    // kernel relocate it and returns MAP_FAILED on error.
    let ptr = unsafe {
        libc::mremap(
            addr.as_ptr().cast(),
            old_len,
            new_len,
            libc::MREMAP_MAYMOVE,
        )
    };
    check_mapped(ptr)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) unsafe fn remap(
    _addr: NonNull<u8>,
    _old_len: usize,
    _new_len: usize,
) -> io::Result<NonNull<u8>> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Flush a page-aligned range of a shared mapping to its file, blocking.
///
/// # Safety
///
/// The range must lie within a live mapping.
pub(crate) unsafe fn memory_sync(addr: NonNull<u8>, len: usize) -> io::Result<()> {
    // SAFETY: caller guarantees a mapped range.
    check_status(unsafe { libc::msync(addr.as_ptr().cast(), len, libc::MS_SYNC) })
}

/// Advise the kernel about a page-aligned range.
///
/// # Safety
///
/// The range must lie within a live mapping. `DontNeed` discards the
/// contents of private anonymous pages.
pub(crate) unsafe fn memory_advise(addr: NonNull<u8>, len: usize, advice: Advice) -> io::Result<()> {
    // SAFETY: caller guarantees a mapped range; the advice is a hint.
    check_status(unsafe { libc::madvise(addr.as_ptr().cast(), len, advice.to_unix_flags()) })
}

/// Lock a page-aligned range into RAM.
///
/// # Safety
///
/// The range must lie within a live region.
pub(crate) unsafe fn memory_lock(addr: NonNull<u8>, len: usize) -> io::Result<()> {
    // SAFETY: caller guarantees a live range.
    check_status(unsafe { libc::mlock(addr.as_ptr().cast_const().cast(), len) })
}

/// Unlock a page-aligned range.
///
/// # Safety
///
/// The range must lie within a live region.
pub(crate) unsafe fn memory_unlock(addr: NonNull<u8>, len: usize) -> io::Result<()> {
    // SAFETY: caller guarantees a live range.
    check_status(unsafe { libc::munlock(addr.as_ptr().cast_const().cast(), len) })
}

/// Query page residency of a page-aligned range, one byte per page in `out`.
///
/// # Safety
///
/// The range must lie within a live mapping and `out` must hold at least one
/// byte per page of the range.
pub(crate) unsafe fn memory_residency(
    addr: NonNull<u8>,
    len: usize,
    out: &mut [u8],
) -> io::Result<()> {
    // SAFETY: caller guarantees the range and the output length.
    check_status(unsafe { libc::mincore(addr.as_ptr().cast(), len, out.as_mut_ptr().cast()) })
}

/// Allocate `len` uninitialised bytes with malloc.
pub(crate) fn malloc(len: usize) -> Option<NonNull<u8>> {
    // SAFETY: FFI call to malloc; null signals failure.
    NonNull::new(unsafe { libc::malloc(len) }.cast::<u8>())
}

/// Resize a malloc block. On `None` the old block is untouched.
///
/// # Safety
///
/// `ptr` must come from `malloc`/`realloc` and not have been freed. On
/// success it must not be used again.
pub(crate) unsafe fn realloc(ptr: NonNull<u8>, new_len: usize) -> Option<NonNull<u8>> {
    // SAFETY: caller guarantees ptr is a live malloc block.
    NonNull::new(unsafe { libc::realloc(ptr.as_ptr().cast(), new_len) }.cast::<u8>())
}

/// Release a malloc block.
///
/// # Safety
///
/// `ptr` must come from `malloc`/`realloc` and not have been freed.
pub(crate) unsafe fn free(ptr: NonNull<u8>) {
    // SAFETY: caller guarantees ptr is a live malloc block.
    unsafe { libc::free(ptr.as_ptr().cast()) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_mapping_is_zeroed_and_writable() {
        let len = 8192;
        let addr = map_anonymous(len).unwrap();
        unsafe {
            assert_eq!(*addr.as_ptr().add(100), 0);
            *addr.as_ptr().add(100) = 7;
            assert_eq!(*addr.as_ptr().add(100), 7);
            memory_advise(addr, len, Advice::Sequential).unwrap();
            unmap(addr, len).unwrap();
        }
    }

    #[test]
    fn test_dev_zero_mapping() {
        let addr = map_dev_zero(4096).unwrap();
        unsafe {
            *addr.as_ptr() = 1;
            assert_eq!(*addr.as_ptr(), 1);
            unmap(addr, 4096).unwrap();
        }
    }

    #[test]
    fn test_malloc_realloc_preserves_prefix() {
        let ptr = malloc(16).unwrap();
        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0xAB, 16);
            let grown = realloc(ptr, 4096).unwrap();
            assert_eq!(*grown.as_ptr().add(15), 0xAB);
            free(grown);
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_remap_preserves_contents() {
        let addr = map_anonymous(4096).unwrap();
        unsafe {
            *addr.as_ptr().add(4095) = 42;
            let moved = remap(addr, 4096, 3 * 4096).unwrap();
            assert_eq!(*moved.as_ptr().add(4095), 42);
            assert_eq!(*moved.as_ptr().add(8192), 0);
            unmap(moved, 3 * 4096).unwrap();
        }
    }

    #[test]
    fn test_unmap_invalid_range_reports_errno() {
        let addr = map_anonymous(4096).unwrap();
        // unaligned address
        let bad = unsafe { NonNull::new_unchecked(addr.as_ptr().add(1)) };
        let err = unsafe { unmap(bad, 4096) }.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        unsafe { unmap(addr, 4096).unwrap() };
    }
}
