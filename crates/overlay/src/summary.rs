//! Periodic cache summary logging.

use std::sync::Arc;
use std::time::Duration;

use cachefs_repository::{CacheRepository, CacheStats};

/// Spawn a background task logging a cache summary at a fixed interval.
///
/// The task runs until the returned handle is aborted or the runtime
/// shuts down.
///
/// # Arguments
/// * `cache` - Repository to report on
/// * `interval` - Time between summaries
pub fn spawn_summary_task(
    cache: Arc<CacheRepository>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker: tokio::time::Interval = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so the first
        // summary reflects a full interval of activity.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats: CacheStats = cache.stats();
            tracing::info!(
                "Cache summary: {} entries, {} bytes, {} hits, {} loads, {} evictions",
                stats.entry_count,
                stats.cached_bytes,
                stats.hits,
                stats.loads,
                stats.evictions
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachefs_repository::MemoryStore;

    #[tokio::test]
    async fn test_summary_task_runs_and_aborts() {
        let cache: Arc<CacheRepository> =
            Arc::new(CacheRepository::new(Arc::new(MemoryStore::new())));
        let handle = spawn_summary_task(cache, Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
