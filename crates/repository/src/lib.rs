//! Read-through in-memory byte cache in front of a backing file store.
//!
//! Every read of a path goes through the [`CacheRepository`]: if a fresh
//! snapshot of the file is cached it is served from memory, otherwise the
//! full content is loaded from the backing store, cached, and served. A
//! cached snapshot is stale as soon as the backing store reports a newer
//! modification time than the one captured with the snapshot.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: Overlay surface (cachefs-overlay, per-platform adapters)
//! Layer 1: CacheRepository (staleness, single-flight loads, serving)
//! Layer 0: BackingStore (LocalStore, MemoryStore, ...)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cachefs_repository::{CacheRepository, LocalStore};
//!
//! let repo = CacheRepository::new(Arc::new(LocalStore));
//! let mut source = repo.get_stream(Path::new("/data/scene.bin")).await?;
//! source.seek(SeekFrom::Start(offset))?;
//! source.read(&mut buf)?;
//! ```

pub mod entry;
pub mod error;
pub mod local;
pub mod repository;
pub mod source;
pub mod store;

pub use entry::CacheEntry;
pub use error::{CacheError, StoreError};
pub use local::LocalStore;
pub use repository::{CacheRepository, CacheRepositoryOptions, CacheStats};
pub use source::ByteSource;
pub use store::{BackingStore, MemoryStore, ReadSeek};
