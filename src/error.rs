//! Failure taxonomy for resilient storage operations

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Discriminant used by retry filters to decide whether a failure is
/// worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Contention, sharing violation, momentary unavailability.
    Transient,
    /// A write target's parent directory does not exist.
    MissingParent,
    /// The target is protected.
    PermissionDenied,
    /// The source of a read/copy/move does not exist.
    NotFound,
    /// Anything else; never retried by the standard storage policy.
    Other,
}

/// Error type for [`crate::ResilientStorage`] operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("transient I/O failure on {}: {source}", .path.display())]
    Transient { path: PathBuf, source: io::Error },

    #[error("parent directory missing for {}: {source}", .path.display())]
    MissingParent { path: PathBuf, source: io::Error },

    #[error("permission denied on {}: {source}", .path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    #[error("not found: {}", .path.display())]
    NotFound { path: PathBuf, source: io::Error },

    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// The failure kind this error classifies as.
    pub fn kind(&self) -> FailureKind {
        match self {
            StorageError::Transient { .. } => FailureKind::Transient,
            StorageError::MissingParent { .. } => FailureKind::MissingParent,
            StorageError::PermissionDenied { .. } => FailureKind::PermissionDenied,
            StorageError::NotFound { .. } => FailureKind::NotFound,
            StorageError::Io { .. } => FailureKind::Other,
        }
    }

    /// The path the failing operation was addressing.
    pub fn path(&self) -> &Path {
        match self {
            StorageError::Transient { path, .. }
            | StorageError::MissingParent { path, .. }
            | StorageError::PermissionDenied { path, .. }
            | StorageError::NotFound { path, .. }
            | StorageError::Io { path, .. } => path,
        }
    }

    /// Classify an `io::Error` raised by a read-class operation.
    ///
    /// `NotFound` here means the target itself is absent.
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound { path, source },
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied { path, source },
            _ if is_transient(&source) => StorageError::Transient { path, source },
            _ => StorageError::Io { path, source },
        }
    }

    /// Classify an `io::Error` raised by a write-class operation.
    ///
    /// `NotFound` on a write means the parent directory is what is missing,
    /// so it maps to [`FailureKind::MissingParent`].
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => StorageError::MissingParent { path, source },
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied { path, source },
            _ if is_transient(&source) => StorageError::Transient { path, source },
            _ => StorageError::Io { path, source },
        }
    }

    /// A `NotFound` failure raised by a pre-check, before any attempt is made.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        StorageError::NotFound {
            path: path.into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        }
    }
}

/// Whether an `io::Error` looks like momentary contention rather than a
/// durable failure.
fn is_transient(err: &io::Error) -> bool {
    #[cfg(windows)]
    {
        // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION surface as
        // uncategorized errors but clear up once the other handle closes.
        if matches!(err.raw_os_error(), Some(32) | Some(33)) {
            return true;
        }
    }

    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ResourceBusy
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err(kind: io::ErrorKind) -> io::Error {
        io::Error::new(kind, "synthetic")
    }

    #[test]
    fn test_read_classification() {
        let err = StorageError::read("/tmp/a.txt", io_err(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), FailureKind::NotFound);

        let err = StorageError::read("/tmp/a.txt", io_err(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), FailureKind::PermissionDenied);

        let err = StorageError::read("/tmp/a.txt", io_err(io::ErrorKind::Interrupted));
        assert_eq!(err.kind(), FailureKind::Transient);

        let err = StorageError::read("/tmp/a.txt", io_err(io::ErrorKind::InvalidData));
        assert_eq!(err.kind(), FailureKind::Other);
    }

    #[test]
    fn test_write_not_found_means_missing_parent() {
        let err = StorageError::write("/tmp/missing/a.txt", io_err(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), FailureKind::MissingParent);
    }

    #[test]
    fn test_transient_kinds() {
        for kind in [
            io::ErrorKind::Interrupted,
            io::ErrorKind::TimedOut,
            io::ErrorKind::WouldBlock,
            io::ErrorKind::ResourceBusy,
        ] {
            let err = StorageError::write("/tmp/a.txt", io_err(kind));
            assert_eq!(err.kind(), FailureKind::Transient, "kind {kind:?}");
        }
    }

    #[test]
    fn test_display_contains_path() {
        let err = StorageError::read("/tmp/a.txt", io_err(io::ErrorKind::NotFound));
        assert!(format!("{err}").contains("/tmp/a.txt"));

        let err = StorageError::write("/tmp/b.txt", io_err(io::ErrorKind::TimedOut));
        let rendered = format!("{err}");
        assert!(rendered.contains("transient"));
        assert!(rendered.contains("/tmp/b.txt"));
    }

    #[test]
    fn test_path_accessor() {
        let err = StorageError::not_found("/tmp/gone.txt");
        assert_eq!(err.path(), Path::new("/tmp/gone.txt"));
        assert_eq!(err.kind(), FailureKind::NotFound);
    }

    #[test]
    fn test_source_preserved() {
        let err = StorageError::read("/tmp/a.txt", io_err(io::ErrorKind::PermissionDenied));
        match err {
            StorageError::PermissionDenied { ref source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            _ => panic!("expected PermissionDenied variant"),
        }
    }
}
