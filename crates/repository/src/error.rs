//! Error types for the cache repository.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures reported by a backing store.
///
/// "Not found" is distinguished from other I/O failures so callers can
/// decide whether a fallback makes sense before anything is cached.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File not found in the backing store.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// I/O error while reading from the backing store.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl StoreError {
    /// Map an `std::io::Error` for `path` into a typed store error.
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Failures of [`CacheRepository::get_stream`](crate::CacheRepository::get_stream).
///
/// Load failures are recovered by falling back to a direct store reader;
/// only total backing-store unavailability surfaces to the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Both the cached load and the direct fallback failed.
    #[error("Backing store unavailable for {path}: {source}")]
    BackingStoreUnavailable {
        /// Path the read targeted.
        path: PathBuf,
        /// Failure from the direct fallback open.
        source: StoreError,
    },
}
