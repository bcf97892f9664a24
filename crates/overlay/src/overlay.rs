//! Overlay over a real directory with cached reads.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use cachefs_repository::{ByteSource, CacheRepository, CacheRepositoryOptions, LocalStore};

use crate::error::OverlayError;

/// Metadata for one file or directory, as reported to the host.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Whether this is a symlink.
    pub is_symlink: bool,
    /// Last-modification time, if the filesystem reports one.
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
            modified: metadata.modified().ok(),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (no path components).
    pub name: String,
    /// Entry metadata.
    pub info: FileInfo,
}

/// Overlay over a real directory: reads are intercepted by the cache
/// repository, everything else forwards to the underlying filesystem.
///
/// Virtual paths are rooted at `/` and resolved under the overlay root;
/// the repository only ever sees resolved real paths.
pub struct CacheOverlay {
    root: PathBuf,
    cache: Arc<CacheRepository>,
}

impl CacheOverlay {
    /// Create an overlay with default cache options.
    ///
    /// # Arguments
    /// * `root` - Real directory backing the overlay (must be absolute)
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, OverlayError> {
        Self::with_options(root, CacheRepositoryOptions::default())
    }

    /// Create an overlay with explicit cache options.
    pub fn with_options(
        root: impl Into<PathBuf>,
        options: CacheRepositoryOptions,
    ) -> Result<Self, OverlayError> {
        let root: PathBuf = root.into();
        if !root.is_absolute() {
            return Err(OverlayError::RootNotAbsolute(root));
        }
        let cache: Arc<CacheRepository> = Arc::new(CacheRepository::with_options(
            Arc::new(LocalStore::new()),
            options,
        ));
        Ok(Self { root, cache })
    }

    /// Shared handle to the underlying cache repository.
    pub fn cache(&self) -> &Arc<CacheRepository> {
        &self.cache
    }

    /// Real root directory of the overlay.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to a real path under the root.
    ///
    /// # Arguments
    /// * `virtual_path` - Host-visible path, rooted at `/`
    fn map(&self, virtual_path: &str) -> Result<PathBuf, OverlayError> {
        let rel: &str = virtual_path.trim_start_matches('/');
        let rel_path: &Path = Path::new(rel);
        for component in rel_path.components() {
            if matches!(component, Component::ParentDir | Component::RootDir) {
                return Err(OverlayError::PathEscapesRoot(virtual_path.to_string()));
            }
        }
        Ok(self.root.join(rel_path))
    }

    /// Read up to `buf.len()` bytes of a file starting at `offset`.
    ///
    /// The byte source comes from the cache repository; a shortfall at end
    /// of file is not an error.
    ///
    /// # Returns
    /// Number of bytes actually copied into `buf`.
    pub async fn read(
        &self,
        virtual_path: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        let mut source: ByteSource = self.cache.get_stream(&real).await?;
        source
            .seek(SeekFrom::Start(offset))
            .map_err(|e| OverlayError::from_io(&real, e))?;

        let mut filled: usize = 0;
        while filled < buf.len() {
            let n: usize = source
                .read(&mut buf[filled..])
                .map_err(|e| OverlayError::from_io(&real, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Write `data` to a file at `offset`, creating the file if missing.
    ///
    /// Writes go straight through to the filesystem and are never cached;
    /// the path's cache entry is invalidated so the next read observes the
    /// new content.
    ///
    /// # Returns
    /// Number of bytes written.
    pub async fn write(
        &self,
        virtual_path: &str,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        let mut file: tokio::fs::File = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&real)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;
        file.write_all(data)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;
        file.flush()
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;

        self.cache.invalidate(&real);
        Ok(data.len())
    }

    /// Get metadata for a file or directory.
    pub async fn metadata(&self, virtual_path: &str) -> Result<FileInfo, OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        let metadata: std::fs::Metadata = tokio::fs::symlink_metadata(&real)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;
        Ok(FileInfo::from_metadata(&metadata))
    }

    /// Check whether a path exists under the overlay.
    pub async fn exists(&self, virtual_path: &str) -> bool {
        match self.map(virtual_path) {
            Ok(real) => tokio::fs::symlink_metadata(&real).await.is_ok(),
            Err(_) => false,
        }
    }

    /// List the entries of a directory.
    pub async fn read_dir(&self, virtual_path: &str) -> Result<Vec<DirEntry>, OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        let mut reader: tokio::fs::ReadDir = tokio::fs::read_dir(&real)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;

        let mut entries: Vec<DirEntry> = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?
        {
            let name: String = entry.file_name().to_string_lossy().to_string();
            let metadata: std::fs::Metadata = entry
                .metadata()
                .await
                .map_err(|e| OverlayError::from_io(&entry.path(), e))?;
            entries.push(DirEntry {
                name,
                info: FileInfo::from_metadata(&metadata),
            });
        }
        Ok(entries)
    }

    /// Create a directory (and missing parents).
    pub async fn create_dir(&self, virtual_path: &str) -> Result<(), OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        tokio::fs::create_dir_all(&real)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))
    }

    /// Delete a file and drop its cache entry.
    pub async fn remove_file(&self, virtual_path: &str) -> Result<(), OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        tokio::fs::remove_file(&real)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))?;
        self.cache.invalidate(&real);
        Ok(())
    }

    /// Delete an empty directory.
    pub async fn remove_dir(&self, virtual_path: &str) -> Result<(), OverlayError> {
        let real: PathBuf = self.map(virtual_path)?;
        tokio::fs::remove_dir(&real)
            .await
            .map_err(|e| OverlayError::from_io(&real, e))
    }

    /// Rename a file or directory, dropping cache entries at both ends.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), OverlayError> {
        let real_from: PathBuf = self.map(from)?;
        let real_to: PathBuf = self.map(to)?;
        tokio::fs::rename(&real_from, &real_to)
            .await
            .map_err(|e| OverlayError::from_io(&real_from, e))?;
        self.cache.invalidate(&real_from);
        self.cache.invalidate(&real_to);
        Ok(())
    }
}
