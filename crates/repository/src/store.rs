//! BackingStore trait for file content retrieval.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::StoreError;

/// Seekable, readable byte handle.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Narrow read-only view of the underlying file store.
///
/// Implement this trait to put the cache in front of different backends
/// (local disk, memory, network shares, etc.). The repository never writes
/// through this trait.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Read the entire content of a file.
    ///
    /// # Arguments
    /// * `path` - Absolute real path within the store
    ///
    /// # Returns
    /// The full file content as a byte vector.
    async fn read_all_bytes(&self, path: &Path) -> Result<Vec<u8>, StoreError>;

    /// Get the last-modification time of a file.
    ///
    /// # Arguments
    /// * `path` - Absolute real path within the store
    async fn last_modified(&self, path: &Path) -> Result<SystemTime, StoreError>;

    /// Open a direct, uncached reader over a file.
    ///
    /// Used as the fallback byte source when a path is not served from
    /// cache. Bytes read through this handle are never cached.
    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>, StoreError>;
}

/// One file held by [`MemoryStore`].
#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified: SystemTime,
}

/// In-memory backing store for testing.
///
/// Modification times are set explicitly by the caller, which makes
/// staleness transitions deterministic in tests. Every `read_all_bytes`
/// call is counted, so tests can assert how many physical reads a cache
/// interaction performed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<PathBuf, MemoryFile>>,
    read_count: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file.
    ///
    /// # Arguments
    /// * `path` - Absolute path of the file
    /// * `data` - File content
    /// * `modified` - Last-modification time to report
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>, modified: SystemTime) {
        self.files.write().unwrap().insert(
            path.into(),
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
    }

    /// Remove a file from the store.
    pub fn remove(&self, path: &Path) {
        self.files.write().unwrap().remove(path);
    }

    /// Number of `read_all_bytes` calls performed so far.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn read_all_bytes(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.files
            .read()
            .unwrap()
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    async fn last_modified(&self, path: &Path) -> Result<SystemTime, StoreError> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>, StoreError> {
        let data: Vec<u8> = self
            .files
            .read()
            .unwrap()
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))?;
        Ok(Box::new(Cursor::new(data)))
    }
}
