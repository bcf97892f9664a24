//! Local-filesystem backing store.

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{BackingStore, ReadSeek};

/// Backing store over the host filesystem.
///
/// Paths handed to this store must already be resolved to real, absolute
/// paths; virtual-root translation is the caller's responsibility.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl LocalStore {
    /// Create a new local store.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackingStore for LocalStore {
    async fn read_all_bytes(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn last_modified(&self, path: &Path) -> Result<SystemTime, StoreError> {
        let metadata: std::fs::Metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        metadata.modified().map_err(|e| StoreError::from_io(path, e))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>, StoreError> {
        let file: std::fs::File =
            std::fs::File::open(path).map_err(|e| StoreError::from_io(path, e))?;
        Ok(Box::new(file))
    }
}
