//! Standalone error types for nebula-mmap
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. Every native
//! failure keeps the platform errno so callers can tell `ENOMEM` from `EPERM`
//! without parsing messages.

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::error;

// ============================================================================
// Main Error Types
// ============================================================================

/// Errors raised by memory views, native buffers and mappings
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MemoryError {
    // --- Bounds Errors ---
    #[error("Access out of bounds: offset {offset} width {width} (length: {length})")]
    OutOfBounds {
        offset: usize,
        width: usize,
        length: usize,
    },

    #[error("Invalid range: start {start} length {length} (available: {available})")]
    InvalidRange {
        start: usize,
        length: usize,
        available: usize,
    },

    #[error("Write to read-only memory: offset {offset} length {length}")]
    ReadOnly { offset: usize, length: usize },

    // --- Stream Errors ---
    #[error("End of stream at position {position}: needed {needed} bytes (length: {length})")]
    EndOfStream {
        position: usize,
        needed: usize,
        length: usize,
    },

    // --- Native Errors ---
    #[error("{operation}({target}) failed [Errno {errno}]")]
    Syscall {
        operation: &'static str,
        target: String,
        errno: i32,
    },

    #[error("Out of memory during {operation}: {requested} bytes")]
    OutOfMemory {
        operation: &'static str,
        requested: usize,
    },

    // --- Feature Support Errors ---
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: &'static str },

    // --- File Errors ---
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    // --- General Errors ---
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MemoryError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Syscall { errno, .. } => *errno == libc::EAGAIN || *errno == libc::EINTR,
            Self::OutOfMemory { .. } => true,
            _ => false,
        }
    }

    /// Whether this error reports an access outside a memory range
    #[must_use]
    pub fn is_bounds_violation(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. } | Self::InvalidRange { .. })
    }

    /// Platform error number, if the error came from a native call
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Syscall { errno, .. } => Some(*errno),
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "MEM:BOUNDS:ACCESS",
            Self::InvalidRange { .. } => "MEM:BOUNDS:RANGE",
            Self::ReadOnly { .. } => "MEM:BOUNDS:READ_ONLY",
            Self::EndOfStream { .. } => "MEM:STREAM:EOF",
            Self::Syscall { .. } => "MEM:NATIVE:SYSCALL",
            Self::OutOfMemory { .. } => "MEM:NATIVE:OOM",
            Self::Unsupported { .. } => "MEM:FEATURE:UNSUPPORTED",
            Self::NotFound { .. } => "MEM:FILE:NOT_FOUND",
            Self::Io { .. } => "MEM:FILE:IO",
            Self::InvalidArgument { .. } => "MEM:INVALID_ARG",
            Self::InvalidState { .. } => "MEM:SYSTEM:STATE",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create an out-of-bounds access error
    pub fn out_of_bounds(offset: usize, width: usize, length: usize) -> Self {
        Self::OutOfBounds {
            offset,
            width,
            length,
        }
    }

    /// Create an invalid range error
    pub fn invalid_range(start: usize, length: usize, available: usize) -> Self {
        Self::InvalidRange {
            start,
            length,
            available,
        }
    }

    /// Create an end-of-stream error
    pub fn end_of_stream(position: usize, needed: usize, length: usize) -> Self {
        Self::EndOfStream {
            position,
            needed,
            length,
        }
    }

    /// Create a syscall failure error from an explicit errno
    pub fn syscall(operation: &'static str, target: impl Into<String>, errno: i32) -> Self {
        let target = target.into();
        error!(operation, %target, errno, "native call failed");

        Self::Syscall {
            operation,
            target,
            errno,
        }
    }

    /// Create a syscall failure error from an `io::Error` returned by a wrapper
    pub fn from_os(operation: &'static str, target: impl Into<String>, err: &io::Error) -> Self {
        Self::syscall(operation, target, err.raw_os_error().unwrap_or(0))
    }

    /// Create an out-of-memory error
    pub fn out_of_memory(operation: &'static str, requested: usize) -> Self {
        error!(operation, requested, "native allocation failed");

        Self::OutOfMemory {
            operation,
            requested,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Create a file not found error
    pub fn not_found(path: &Path) -> Self {
        Self::NotFound {
            path: path.display().to_string(),
        }
    }

    /// Wrap an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create invalid state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl From<MemoryError> for io::Error {
    fn from(err: MemoryError) -> Self {
        let kind = match &err {
            MemoryError::OutOfBounds { .. }
            | MemoryError::InvalidRange { .. }
            | MemoryError::InvalidArgument { .. }
            | MemoryError::InvalidConfig { .. } => io::ErrorKind::InvalidInput,
            MemoryError::ReadOnly { .. } => io::ErrorKind::PermissionDenied,
            MemoryError::EndOfStream { .. } => io::ErrorKind::UnexpectedEof,
            MemoryError::Syscall { errno, .. } => io::Error::from_raw_os_error(*errno).kind(),
            MemoryError::OutOfMemory { .. } => io::ErrorKind::OutOfMemory,
            MemoryError::Unsupported { .. } => io::ErrorKind::Unsupported,
            MemoryError::NotFound { .. } => io::ErrorKind::NotFound,
            MemoryError::Io { source, .. } => source.kind(),
            MemoryError::InvalidState { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================
