//! Native bindings and platform capabilities
//!
//! - **direct.rs** - libc wrappers (mmap, munmap, mremap, msync, madvise,
//!   mlock, munlock, mincore, malloc, realloc, free)
//!
//! Platform differences (anonymous mapping flag, mremap) are resolved once
//! into [`Capabilities`] instead of being tested at each call site.

mod direct;

use std::io;
use std::sync::OnceLock;

pub use self::direct::Advice;
pub(crate) use self::direct::*;
use crate::error::MemoryError;

/// Page size assumed when `sysconf` gives no answer
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Size of a virtual memory page
pub fn page_size() -> usize {
    // SAFETY: sysconf only reads a system constant.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { FALLBACK_PAGE_SIZE }
}

/// Start of the page containing `addr`
#[inline]
pub(crate) fn page_floor(addr: usize, page: usize) -> usize {
    addr & !(page - 1)
}

/// `(start, len)` of the whole-page span covering `[addr, addr + len)`
#[inline]
pub(crate) fn page_span(addr: usize, len: usize, page: usize) -> (usize, usize) {
    let start = page_floor(addr, page);
    let end = (addr + len).div_ceil(page) * page;
    (start, end - start)
}

/// Run `call`, repeating it once if it fails with `EAGAIN`.
pub(crate) fn retry_on_again<T>(mut call: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    match call() {
        Err(err) if err.raw_os_error() == Some(libc::EAGAIN) => call(),
        result => result,
    }
}

/// Classify a failed `mlock`/`munlock`: resource exhaustion is reported as
/// out of memory, anything else as a syscall failure.
pub(crate) fn lock_error(
    operation: &'static str,
    target: String,
    requested: usize,
    err: &io::Error,
) -> MemoryError {
    match err.raw_os_error() {
        Some(libc::ENOMEM | libc::EAGAIN) => MemoryError::out_of_memory(operation, requested),
        _ => MemoryError::from_os(operation, target, err),
    }
}

/// Platform capabilities relevant to native buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Virtual memory page size
    pub page_size: usize,
    /// `MAP_ANONYMOUS` is available; otherwise `/dev/zero` is mapped
    pub anonymous_mapping: bool,
    /// `mremap` can grow a mapping in place
    pub remap: bool,
}

impl Capabilities {
    /// Detect capabilities of the running platform
    pub fn detect() -> Self {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            Self {
                page_size: page_size(),
                anonymous_mapping: true,
                remap: true,
            }
        }

        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        ))]
        {
            Self {
                page_size: page_size(),
                anonymous_mapping: true,
                remap: false,
            }
        }

        #[cfg(not(any(
            target_os = "linux",
            target_os = "android",
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        )))]
        {
            Self {
                page_size: page_size(),
                anonymous_mapping: false,
                remap: false,
            }
        }
    }

    /// Capabilities detected once for this process
    pub fn current() -> Self {
        static CURRENT: OnceLock<Capabilities> = OnceLock::new();
        *CURRENT.get_or_init(Self::detect)
    }

    /// Same capabilities with `mremap` disabled
    pub fn without_remap(self) -> Self {
        Self {
            remap: false,
            ..self
        }
    }

    /// Same capabilities with the anonymous flag disabled
    pub fn without_anonymous_mapping(self) -> Self {
        Self {
            anonymous_mapping: false,
            ..self
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::current()
    }
}
