//! The cache repository: path-keyed snapshots with read-through loading.
//!
//! # Thread safety
//!
//! One mutex guards the `entries` and `pending_loads` maps and is held
//! only for check/insert/remove sequences, never across store I/O. Cache
//! hits for already-cached paths therefore never wait behind another
//! path's load. Load coordination prevents duplicate store reads: the
//! first caller for an uncached path registers a shared future, performs
//! the read outside the lock, and broadcasts the result to every caller
//! that raced it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::entry::CacheEntry;
use crate::error::{CacheError, StoreError};
use crate::source::ByteSource;
use crate::store::BackingStore;

/// Outcome of one physical load: a cached entry, a bypass decision
/// (`None`), or a failure folded to a string so the shared future output
/// stays `Clone`.
type LoadOutcome = Result<Option<Arc<CacheEntry>>, String>;

type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

/// Configuration for a [`CacheRepository`].
#[derive(Debug, Clone, Default)]
pub struct CacheRepositoryOptions {
    /// Files larger than this many bytes bypass the cache and are always
    /// served directly from the backing store. `None` caches everything.
    pub max_entry_size: Option<u64>,
}

/// Statistics snapshot from the repository.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cached entries.
    pub entry_count: usize,
    /// Total bytes held by cached snapshots.
    pub cached_bytes: u64,
    /// Loads currently in flight.
    pub pending_loads: usize,
    /// Serves from an already-cached entry.
    pub hits: u64,
    /// Successful physical loads from the backing store.
    pub loads: u64,
    /// Entries removed because they went stale or were invalidated.
    pub evictions: u64,
}

struct RepositoryInner {
    entries: HashMap<PathBuf, Arc<CacheEntry>>,
    pending_loads: HashMap<PathBuf, SharedLoad>,
}

/// Read-through cache over a backing store, keyed by absolute path.
///
/// Constructed once at service start and shared by reference among all
/// callers; the repository holds no background tasks and no teardown is
/// needed beyond dropping it.
pub struct CacheRepository {
    store: Arc<dyn BackingStore>,
    options: CacheRepositoryOptions,
    inner: Mutex<RepositoryInner>,
    hits: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

impl CacheRepository {
    /// Create a repository with default options.
    ///
    /// # Arguments
    /// * `store` - Backing store the cache sits in front of
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self::with_options(store, CacheRepositoryOptions::default())
    }

    /// Create a repository with explicit options.
    pub fn with_options(store: Arc<dyn BackingStore>, options: CacheRepositoryOptions) -> Self {
        Self {
            store,
            options,
            inner: Mutex::new(RepositoryInner {
                entries: HashMap::new(),
                pending_loads: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a readable, seekable byte source for `path`.
    ///
    /// Serves from cache when a fresh snapshot exists, loads and caches on
    /// a miss, and falls back to a direct store reader when the load fails
    /// or the file bypasses caching by size. Fails only when the direct
    /// fallback is also unavailable.
    ///
    /// # Arguments
    /// * `path` - Absolute real path in the backing store
    pub async fn get_stream(&self, path: &Path) -> Result<ByteSource, CacheError> {
        self.evict_if_stale(path).await;

        match self.entry_for(path).await {
            Ok(Some(entry)) => {
                entry.touch();
                Ok(ByteSource::from_snapshot(entry.data()))
            }
            Ok(None) => self.direct(path),
            Err(reason) => {
                tracing::debug!(
                    "Load failed for {}, serving direct: {}",
                    path.display(),
                    reason
                );
                self.direct(path)
            }
        }
    }

    /// Remove the entry for `path`, if any.
    ///
    /// Used by write paths so the next read observes fresh content even
    /// when the store's mtime granularity would hide the change.
    pub fn invalidate(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let removed: bool = inner.entries.remove(path).is_some();
        drop(inner);
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Invalidated cache entry: {}", path.display());
        }
        removed
    }

    /// Remove all cached entries. In-flight loads are unaffected.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        let removed: usize = inner.entries.len();
        inner.entries.clear();
        drop(inner);
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Check if a snapshot is currently cached for `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().entries.contains_key(path)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect current repository statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let entry_count: usize = inner.entries.len();
        let cached_bytes: u64 = inner.entries.values().map(|e| e.size()).sum();
        let pending_loads: usize = inner.pending_loads.len();
        drop(inner);

        CacheStats {
            entry_count,
            cached_bytes,
            pending_loads,
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop the entry for `path` if the store has been modified since the
    /// snapshot was captured.
    ///
    /// A failed stat also evicts: the snapshot can no longer be validated,
    /// and the reload attempt that follows decides the outcome.
    async fn evict_if_stale(&self, path: &Path) {
        let current: Arc<CacheEntry> = {
            let inner = self.inner.lock().unwrap();
            match inner.entries.get(path) {
                Some(entry) => entry.clone(),
                None => return,
            }
        };

        let stale: bool = match self.store.last_modified(path).await {
            Ok(mtime) => mtime > current.captured_write_time(),
            Err(_) => true,
        };
        if !stale {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        // Only evict the snapshot we checked; a concurrent load may have
        // already replaced it with a fresher one.
        let same_snapshot: bool = inner
            .entries
            .get(path)
            .is_some_and(|existing| Arc::ptr_eq(existing, &current));
        if same_snapshot {
            inner.entries.remove(path);
            drop(inner);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Evicted stale entry: {}", path.display());
        }
    }

    /// Get the cached entry for `path`, loading it if absent.
    ///
    /// Returns `Ok(None)` when the file bypasses caching by size.
    async fn entry_for(&self, path: &Path) -> LoadOutcome {
        // Fast path: cached entry, or a load already in flight.
        let pending: Option<SharedLoad> = {
            let inner = self.inner.lock().unwrap();
            if let Some(entry) = inner.entries.get(path) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.clone()));
            }
            inner.pending_loads.get(path).cloned()
        };

        if let Some(shared) = pending {
            return shared.await;
        }

        self.start_load(path).await
    }

    /// Register a load for `path` and perform the physical read.
    async fn start_load(&self, path: &Path) -> LoadOutcome {
        let (tx, rx) = oneshot::channel::<LoadOutcome>();

        // Future all racing callers clone and await.
        let shared: SharedLoad = async move {
            rx.await
                .unwrap_or_else(|_| Err("load cancelled".to_string()))
        }
        .boxed()
        .shared();

        let existing: Option<SharedLoad> = {
            let mut inner = self.inner.lock().unwrap();

            // Double-check: another caller may have finished while we were
            // setting up.
            if let Some(entry) = inner.entries.get(path) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.clone()));
            }

            if let Some(existing) = inner.pending_loads.get(path) {
                Some(existing.clone())
            } else {
                inner.pending_loads.insert(path.to_path_buf(), shared.clone());
                None
            }
        };

        if let Some(shared) = existing {
            return shared.await;
        }

        // Physical read, outside the lock.
        let outcome: LoadOutcome = match self.load_snapshot(path).await {
            Ok(loaded) => Ok(loaded),
            Err(e) => Err(e.to_string()),
        };

        let _ = tx.send(outcome.clone());

        // Publish the entry and unregister the load atomically, so no
        // caller can miss both.
        let mut inner = self.inner.lock().unwrap();
        inner.pending_loads.remove(path);
        if let Ok(Some(entry)) = &outcome {
            inner.entries.insert(path.to_path_buf(), entry.clone());
            self.loads.fetch_add(1, Ordering::Relaxed);
        }
        drop(inner);

        outcome
    }

    /// Read content and mtime from the store and build an entry.
    ///
    /// The mtime is captured before the content read so a write racing the
    /// load leaves the snapshot stale rather than silently current.
    async fn load_snapshot(&self, path: &Path) -> Result<Option<Arc<CacheEntry>>, StoreError> {
        let mtime = self.store.last_modified(path).await?;
        let data: Vec<u8> = self.store.read_all_bytes(path).await?;

        if let Some(limit) = self.options.max_entry_size {
            if data.len() as u64 > limit {
                tracing::debug!(
                    "Bypassing cache for {} ({} bytes over {} limit)",
                    path.display(),
                    data.len(),
                    limit
                );
                return Ok(None);
            }
        }

        tracing::debug!("Cached {} ({} bytes)", path.display(), data.len());
        Ok(Some(Arc::new(CacheEntry::new(data, mtime))))
    }

    /// Open a direct, uncached byte source for `path`.
    fn direct(&self, path: &Path) -> Result<ByteSource, CacheError> {
        match self.store.open_read(path) {
            Ok(reader) => Ok(ByteSource::Direct(reader)),
            Err(source) => Err(CacheError::BackingStoreUnavailable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Read;
    use std::time::{Duration, UNIX_EPOCH};

    fn read_all(mut source: ByteSource) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        source.read_to_end(&mut buf).unwrap();
        buf
    }

    fn repo_with(store: MemoryStore) -> (CacheRepository, Arc<MemoryStore>) {
        let store: Arc<MemoryStore> = Arc::new(store);
        (CacheRepository::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_read_through_and_coherence() {
        let store: MemoryStore = MemoryStore::new();
        store.insert("/a.txt", b"hello".to_vec(), UNIX_EPOCH);
        let (repo, store) = repo_with(store);

        let first: ByteSource = repo.get_stream(Path::new("/a.txt")).await.unwrap();
        assert!(first.is_cached());
        assert_eq!(read_all(first), b"hello");
        assert_eq!(store.read_count(), 1);

        // Second call is served from the snapshot, no physical read.
        let second: ByteSource = repo.get_stream(Path::new("/a.txt")).await.unwrap();
        assert_eq!(read_all(second), b"hello");
        assert_eq!(store.read_count(), 1);
        assert!(repo.contains(Path::new("/a.txt")));
    }

    #[tokio::test]
    async fn test_invalidation_on_newer_mtime() {
        let store: MemoryStore = MemoryStore::new();
        let t0: std::time::SystemTime = UNIX_EPOCH + Duration::from_secs(100);
        let t1: std::time::SystemTime = t0 + Duration::from_secs(1);
        store.insert("/a.txt", b"hello".to_vec(), t0);
        let (repo, store) = repo_with(store);

        assert_eq!(read_all(repo.get_stream(Path::new("/a.txt")).await.unwrap()), b"hello");

        // Rewrite with a strictly newer mtime.
        store.insert("/a.txt", b"world".to_vec(), t1);
        assert_eq!(read_all(repo.get_stream(Path::new("/a.txt")).await.unwrap()), b"world");
        assert_eq!(store.read_count(), 2);
        assert_eq!(repo.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_equal_mtime_is_not_stale() {
        let store: MemoryStore = MemoryStore::new();
        let t0: std::time::SystemTime = UNIX_EPOCH + Duration::from_secs(100);
        store.insert("/a.txt", b"hello".to_vec(), t0);
        let (repo, store) = repo_with(store);

        assert_eq!(read_all(repo.get_stream(Path::new("/a.txt")).await.unwrap()), b"hello");

        // Same mtime: the snapshot is still considered current.
        store.insert("/a.txt", b"other".to_vec(), t0);
        assert_eq!(read_all(repo.get_stream(Path::new("/a.txt")).await.unwrap()), b"hello");
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_isolation_across_paths() {
        let store: MemoryStore = MemoryStore::new();
        let t0: std::time::SystemTime = UNIX_EPOCH + Duration::from_secs(100);
        store.insert("/a.txt", b"aaa".to_vec(), t0);
        store.insert("/b.txt", b"bbb".to_vec(), t0);
        let (repo, store) = repo_with(store);

        repo.get_stream(Path::new("/a.txt")).await.unwrap();
        repo.get_stream(Path::new("/b.txt")).await.unwrap();

        // Evicting /a.txt leaves /b.txt cached.
        store.insert("/a.txt", b"AAA".to_vec(), t0 + Duration::from_secs(1));
        assert_eq!(read_all(repo.get_stream(Path::new("/a.txt")).await.unwrap()), b"AAA");
        assert!(repo.contains(Path::new("/b.txt")));
        assert_eq!(read_all(repo.get_stream(Path::new("/b.txt")).await.unwrap()), b"bbb");
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_fails_without_caching() {
        let store: MemoryStore = MemoryStore::new();
        let (repo, store) = repo_with(store);

        let result = repo.get_stream(Path::new("/missing.txt")).await;
        assert!(matches!(
            result,
            Err(CacheError::BackingStoreUnavailable { .. })
        ));
        assert!(repo.is_empty());
        // The failed stat short-circuits before the content read.
        assert_eq!(store.read_count(), 0);

        // The repository stays usable for other paths.
        store.insert("/ok.txt", b"fine".to_vec(), UNIX_EPOCH);
        assert_eq!(read_all(repo.get_stream(Path::new("/ok.txt")).await.unwrap()), b"fine");
    }

    #[tokio::test]
    async fn test_stat_failure_evicts_cached_entry() {
        let store: MemoryStore = MemoryStore::new();
        store.insert("/a.txt", b"hello".to_vec(), UNIX_EPOCH);
        let (repo, store) = repo_with(store);

        repo.get_stream(Path::new("/a.txt")).await.unwrap();
        assert!(repo.contains(Path::new("/a.txt")));

        // The file vanishes; the entry can no longer be validated.
        store.remove(Path::new("/a.txt"));
        let result = repo.get_stream(Path::new("/a.txt")).await;
        assert!(result.is_err());
        assert!(!repo.contains(Path::new("/a.txt")));
    }

    #[tokio::test]
    async fn test_oversized_file_bypasses_cache() {
        let store: MemoryStore = MemoryStore::new();
        store.insert("/big.bin", vec![7u8; 64], UNIX_EPOCH);
        let store: Arc<MemoryStore> = Arc::new(store);
        let repo: CacheRepository = CacheRepository::with_options(
            store.clone(),
            CacheRepositoryOptions {
                max_entry_size: Some(16),
            },
        );

        let source: ByteSource = repo.get_stream(Path::new("/big.bin")).await.unwrap();
        assert!(!source.is_cached());
        assert_eq!(read_all(source), vec![7u8; 64]);
        assert!(!repo.contains(Path::new("/big.bin")));

        // Every read of a bypassed file goes back to the store.
        repo.get_stream(Path::new("/big.bin")).await.unwrap();
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let store: MemoryStore = MemoryStore::new();
        store.insert("/a.txt", b"hello".to_vec(), UNIX_EPOCH);
        let (repo, store) = repo_with(store);

        repo.get_stream(Path::new("/a.txt")).await.unwrap();
        assert!(repo.invalidate(Path::new("/a.txt")));
        assert!(!repo.invalidate(Path::new("/a.txt")));

        repo.get_stream(Path::new("/a.txt")).await.unwrap();
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let store: MemoryStore = MemoryStore::new();
        store.insert("/a.txt", b"a".to_vec(), UNIX_EPOCH);
        store.insert("/b.txt", b"b".to_vec(), UNIX_EPOCH);
        let (repo, _store) = repo_with(store);

        repo.get_stream(Path::new("/a.txt")).await.unwrap();
        repo.get_stream(Path::new("/b.txt")).await.unwrap();
        assert_eq!(repo.len(), 2);

        repo.clear();
        assert!(repo.is_empty());
        assert_eq!(repo.stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let store: MemoryStore = MemoryStore::new();
        store.insert("/a.txt", b"hello".to_vec(), UNIX_EPOCH);
        let (repo, _store) = repo_with(store);

        repo.get_stream(Path::new("/a.txt")).await.unwrap();
        repo.get_stream(Path::new("/a.txt")).await.unwrap();

        let stats: CacheStats = repo.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.cached_bytes, 5);
        assert_eq!(stats.pending_loads, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_backing_change_mid_read() {
        let store: MemoryStore = MemoryStore::new();
        let t0: std::time::SystemTime = UNIX_EPOCH + Duration::from_secs(100);
        store.insert("/a.txt", b"hello".to_vec(), t0);
        let (repo, store) = repo_with(store);

        let source: ByteSource = repo.get_stream(Path::new("/a.txt")).await.unwrap();

        // Rewrite the backing file while the source is still open.
        store.insert("/a.txt", b"WORLD".to_vec(), t0 + Duration::from_secs(1));
        assert_eq!(read_all(source), b"hello");
    }
}
