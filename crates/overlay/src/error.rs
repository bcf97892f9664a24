//! Error types for the overlay surface.

use std::path::{Path, PathBuf};

use thiserror::Error;

use cachefs_repository::CacheError;

/// Errors from overlay operations.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Overlay root must be an absolute path.
    #[error("Overlay root must be absolute: {0}")]
    RootNotAbsolute(PathBuf),

    /// Virtual path resolves outside the overlay root.
    #[error("Path escapes overlay root: {0}")]
    PathEscapesRoot(String),

    /// Cache repository failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// I/O error on a forwarded operation.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Real path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl OverlayError {
    /// Map an `std::io::Error` for `path` into an overlay error.
    pub(crate) fn from_io(path: &Path, source: std::io::Error) -> Self {
        OverlayError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
