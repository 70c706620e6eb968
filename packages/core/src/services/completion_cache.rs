//! Per-agent Completion Cache
//!
//! Caches each facilitator's task completion percentage keyed by agent id.
//!
//! # Cache Invalidation
//!
//! Time-based only: an entry older than the TTL (default one hour) is treated
//! as a miss and recomputed on the next access. Expired entries are dropped
//! whenever a new value is stored. Nothing is invalidated when tasks change,
//! so readers may see a value up to one TTL old.
//!
//! The cache is best-effort. A failed computation is returned to the caller
//! and leaves the previous entry untouched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default TTL for cached completion percentages
pub const DEFAULT_COMPLETION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct CompletionCache {
    entries: Arc<RwLock<HashMap<i64, (f64, Instant)>>>,
    ttl: Duration,
}

impl Default for CompletionCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_COMPLETION_TTL)
    }
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached value for `agent_id`, if any
    pub async fn get(&self, agent_id: i64) -> Option<f64> {
        let entries = self.entries.read().await;
        entries
            .get(&agent_id)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(value, _)| *value)
    }

    /// Store a value and evict every expired entry
    pub async fn insert(&self, agent_id: i64, value: f64) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
        entries.insert(agent_id, (value, Instant::now()));
    }

    /// Cached value, or the result of `compute` (stored on success)
    pub async fn get_or_compute<F, Fut, E>(&self, agent_id: i64, compute: F) -> Result<f64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<f64, E>>,
    {
        if let Some(value) = self.get(agent_id).await {
            tracing::trace!(agent_id, "Completion cache hit");
            return Ok(value);
        }

        let value = compute().await?;
        self.insert(agent_id, value).await;
        Ok(value)
    }

    pub async fn invalidate(&self, agent_id: i64) {
        self.entries.write().await.remove(&agent_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Get cache statistics (for debugging/monitoring)
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let fresh = entries
            .values()
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .count();
        CacheStats {
            entries: entries.len(),
            fresh_entries: fresh,
        }
    }
}

/// Statistics about the completion cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_hit_avoids_recompute() {
        let cache = CompletionCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute(7, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(42.5)
                })
                .await
                .unwrap();
            assert_eq!(value, 42.5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let cache = CompletionCache::with_ttl(Duration::from_millis(20));
        cache.insert(1, 10.0).await;
        assert_eq!(cache.get(1).await, Some(10.0));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(1).await, None);

        let value = cache
            .get_or_compute(1, || async { Ok::<_, ()>(20.0) })
            .await
            .unwrap();
        assert_eq!(value, 20.0);
        assert_eq!(cache.stats().await.fresh_entries, 1);
    }

    #[tokio::test]
    async fn test_insert_evicts_expired_entries() {
        let cache = CompletionCache::with_ttl(Duration::from_millis(20));
        cache.insert(1, 10.0).await;
        cache.insert(2, 20.0).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        cache.insert(3, 30.0).await;
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(cache.get(3).await, Some(30.0));
    }

    #[tokio::test]
    async fn test_failed_compute_is_not_cached() {
        let cache = CompletionCache::new();
        let result = cache
            .get_or_compute(3, || async { Err::<f64, _>("store down") })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.get(3).await, None);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = CompletionCache::new();
        cache.insert(5, 50.0).await;
        cache.invalidate(5).await;
        assert_eq!(cache.get(5).await, None);
        assert_eq!(cache.stats().await.entries, 0);
    }
}
