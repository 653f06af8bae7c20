//! Error types for the bounded-FD store.
//!
//! Errors are stage-specific: [`SpoolError`] covers synchronous rejections at
//! the API boundary (construction, path registration, op submission), while
//! [`OpError`] covers failures delivered through an op's completion. Both are
//! `#[non_exhaustive]` so variants can be added without breaking callers;
//! consumers should include a fallback match arm.
//!
//! # Design Notes
//! - Op-local errors never taint the owning worker; only open/mkdir failures
//!   do, and those surface as [`OpError::WorkerPoisoned`] on every queued and
//!   future op for that path.
//! - I/O errors preserve their source to keep diagnostics actionable.

use std::fmt;
use std::io;

/// Errors surfaced through an op's completion (the ticket).
#[derive(Debug)]
#[non_exhaustive]
pub enum OpError {
    /// The OS returned fewer bytes than requested (including zero at EOF).
    ///
    /// The contract is "read exactly `requested` bytes from the offset";
    /// anything less is reported, never retried.
    ShortRead {
        /// Bytes the op asked for.
        requested: usize,
        /// Bytes the OS actually returned.
        got: usize,
    },
    /// The positional read or write failed at the OS level.
    Io(io::Error),
    /// The worker for this path failed to open its file and was poisoned.
    ///
    /// Every queued and future op on the path fails with this variant; other
    /// paths are unaffected.
    WorkerPoisoned {
        /// Fully-qualified path of the poisoned worker's file.
        path: Box<str>,
        /// Rendering of the open/mkdir error that poisoned the worker.
        detail: Box<str>,
    },
    /// The store was torn down before the op could complete.
    Shutdown,
}

impl OpError {
    /// Creates an I/O error variant.
    #[inline]
    pub fn io(err: io::Error) -> Self {
        Self::Io(err)
    }

    /// Returns `true` if this is a short read.
    #[inline]
    pub fn is_short_read(&self) -> bool {
        matches!(self, Self::ShortRead { .. })
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortRead { requested, got } => {
                write!(f, "short read: got {got} of {requested} bytes")
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::WorkerPoisoned { path, detail } => {
                write!(f, "worker poisoned for {path}: {detail}")
            }
            Self::Shutdown => write!(f, "store shut down before the op completed"),
        }
    }
}

impl std::error::Error for OpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors rejected synchronously at the public API boundary.
#[derive(Debug)]
#[non_exhaustive]
pub enum SpoolError {
    /// Construction-time configuration rejection.
    InvalidConfig {
        /// What was wrong with the configuration.
        detail: Box<str>,
    },
    /// The short path is empty, absolute, or escapes the store directory.
    InvalidShortPath {
        /// The rejected short path.
        path: Box<str>,
        /// Why it was rejected.
        detail: Box<str>,
    },
    /// A read of zero bytes was requested.
    ZeroSizedRead,
    /// A worker thread could not be spawned.
    Spawn(io::Error),
    /// The store's scheduler is no longer running.
    Shutdown,
}

impl SpoolError {
    /// Creates an invalid-config rejection.
    #[inline]
    pub fn invalid_config(detail: impl Into<Box<str>>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Creates an invalid-short-path rejection.
    #[inline]
    pub fn invalid_short_path(path: impl Into<Box<str>>, detail: impl Into<Box<str>>) -> Self {
        Self::InvalidShortPath {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SpoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { detail } => write!(f, "invalid configuration: {detail}"),
            Self::InvalidShortPath { path, detail } => {
                write!(f, "invalid short path {path:?}: {detail}")
            }
            Self::ZeroSizedRead => write!(f, "read size must be greater than zero"),
            Self::Spawn(err) => write!(f, "failed to spawn store thread: {err}"),
            Self::Shutdown => write!(f, "store is shut down"),
        }
    }
}

impl std::error::Error for SpoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_display_carries_counts() {
        let err = OpError::ShortRead {
            requested: 128,
            got: 16,
        };
        let msg = err.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains("128"));
        assert!(err.is_short_read());
    }

    #[test]
    fn io_error_preserves_source() {
        let err = OpError::io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_short_read());
    }

    #[test]
    fn poisoned_display_names_the_path() {
        let err = OpError::WorkerPoisoned {
            path: "/tmp/store/a".into(),
            detail: "permission denied".into(),
        };
        assert!(err.to_string().contains("/tmp/store/a"));
    }

    #[test]
    fn spool_error_displays() {
        let err = SpoolError::invalid_short_path("../up", "parent components are not allowed");
        assert!(err.to_string().contains("../up"));
        assert!(SpoolError::ZeroSizedRead.to_string().contains("zero"));
    }
}
