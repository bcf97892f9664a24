//! Filesystem overlay surface serving reads through the cachefs repository.
//!
//! This crate provides the portable half of a filesystem driver
//! integration: virtual paths are mapped under a real root directory, read
//! operations are served through a [`CacheRepository`], and every other
//! operation (write, metadata, directory enumeration, create/remove/
//! rename) forwards straight to the underlying filesystem. Platform
//! drivers (Dokan, FUSE, ProjFS, ...) are expected to translate their
//! callbacks into calls on [`CacheOverlay`].
//!
//! ```ignore
//! use cachefs_overlay::CacheOverlay;
//!
//! let overlay = CacheOverlay::new("/srv/assets")?;
//! let mut buf = vec![0u8; 4096];
//! let n = overlay.read("/renders/frame-001.exr", 0, &mut buf).await?;
//! ```

pub mod error;
pub mod overlay;
pub mod summary;

pub use error::OverlayError;
pub use overlay::{CacheOverlay, DirEntry, FileInfo};
pub use summary::spawn_summary_task;

pub use cachefs_repository::{CacheRepository, CacheRepositoryOptions, CacheStats};
