//! Cached file snapshots.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// In-memory snapshot of one file's content.
///
/// The data is immutable: a stale entry is replaced by a fresh one, never
/// mutated in place. `captured_write_time` is the backing store's
/// modification time observed when the snapshot was taken; the entry must
/// not be served once the store reports a strictly newer time.
#[derive(Debug)]
pub struct CacheEntry {
    /// Full file content at capture time.
    data: Arc<Vec<u8>>,
    /// Backing store mtime observed at capture.
    captured_write_time: SystemTime,
    /// Last serve time, microseconds since Unix epoch. Recorded for
    /// diagnostics only; no eviction policy consults it.
    last_access_us: AtomicI64,
}

impl CacheEntry {
    /// Create a new entry from loaded content.
    ///
    /// # Arguments
    /// * `data` - Full file content
    /// * `captured_write_time` - Store mtime observed at capture
    pub fn new(data: Vec<u8>, captured_write_time: SystemTime) -> Self {
        Self {
            data: Arc::new(data),
            captured_write_time,
            last_access_us: AtomicI64::new(now_us()),
        }
    }

    /// Shared handle to the snapshot content.
    pub fn data(&self) -> Arc<Vec<u8>> {
        self.data.clone()
    }

    /// Snapshot size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Store mtime observed when the snapshot was taken.
    pub fn captured_write_time(&self) -> SystemTime {
        self.captured_write_time
    }

    /// Record a serve of this entry.
    pub fn touch(&self) {
        self.last_access_us.store(now_us(), Ordering::Relaxed);
    }

    /// Time this entry was last served.
    pub fn last_access(&self) -> SystemTime {
        let us: i64 = self.last_access_us.load(Ordering::Relaxed);
        UNIX_EPOCH + Duration::from_micros(us.max(0) as u64)
    }
}

fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
