//! Bounded cache of similarity indexes keyed by session.
//!
//! Entries are evicted least-recently-used once `capacity` is reached. The
//! lock is never held while an index is being built, so two concurrent
//! misses on the same key may both build; the first insert wins.

use crate::error::Result;
use crate::index::SimilarityIndex;
use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Whether a lookup reused an existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Process-wide map from session key to built index.
pub struct SessionCache {
    entries: Mutex<LruCache<String, Arc<SimilarityIndex>>>,
}

impl SessionCache {
    /// Create a cache holding at most `capacity` indexes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a key, marking it recently used.
    pub async fn get(&self, key: &str) -> Option<Arc<SimilarityIndex>> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Whether a key is cached, without touching its recency.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains(key)
    }

    /// Store `index` unless the key is already present; return the stored index.
    pub async fn insert_if_absent(&self, key: &str, index: Arc<SimilarityIndex>) -> Arc<SimilarityIndex> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key) {
            debug!("Session {} was filled concurrently; keeping first index", key);
            return existing.clone();
        }
        if let Some((evicted, _)) = entries.push(key.to_string(), index.clone()) {
            debug!("Evicted least recently used session {}", evicted);
        }
        index
    }

    /// Return the cached index for `key`, or build and cache one.
    ///
    /// `build` runs only on a miss. A failed build caches nothing.
    pub async fn get_or_build<F, Fut>(
        &self,
        key: &str,
        build: F,
    ) -> Result<(Arc<SimilarityIndex>, CacheOutcome)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SimilarityIndex>>,
    {
        if let Some(index) = self.get(key).await {
            debug!("Cache hit for {}", key);
            return Ok((index, CacheOutcome::Hit));
        }

        debug!("Cache miss for {}, building index", key);
        let built = Arc::new(build().await?);
        let stored = self.insert_if_absent(key, built).await;
        Ok((stored, CacheOutcome::Miss))
    }

    /// Drop a key's index. Returns whether it was present.
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TextChunk;
    use crate::error::TubetalkError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn index(source: &str) -> SimilarityIndex {
        let chunk = TextChunk {
            content: source.to_string(),
            order: 0,
            start_char: 0,
        };
        SimilarityIndex::new(source, source, vec![chunk], vec![vec![1.0]]).unwrap()
    }

    #[tokio::test]
    async fn test_builds_once_per_key() {
        let cache = SessionCache::new(8);
        let builds = AtomicUsize::new(0);

        let build = |url: &'static str| {
            builds.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, TubetalkError>(index(url)) }
        };

        let (first, outcome) = cache.get_or_build("s1", || build("a")).await.unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);

        let (second, outcome) = cache.get_or_build("s1", || build("b")).await.unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.source(), "a");
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache = SessionCache::new(8);

        let result = cache
            .get_or_build("s1", || async {
                Err::<SimilarityIndex, _>(TubetalkError::Retrieval("private video".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains("s1").await);

        let (_, outcome) = cache
            .get_or_build("s1", || async { Ok::<_, TubetalkError>(index("a")) }).await.unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = SessionCache::new(2);
        cache.insert_if_absent("s1", Arc::new(index("a"))).await;
        cache.insert_if_absent("s2", Arc::new(index("b"))).await;

        // Touch s1 so s2 becomes the eviction candidate.
        assert!(cache.get("s1").await.is_some());
        cache.insert_if_absent("s3", Arc::new(index("c"))).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.contains("s1").await);
        assert!(!cache.contains("s2").await);
        assert!(cache.contains("s3").await);
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first() {
        let cache = SessionCache::new(4);
        let first = cache.insert_if_absent("s1", Arc::new(index("a"))).await;
        let second = cache.insert_if_absent("s1", Arc::new(index("b"))).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.source(), "a");
    }

    #[tokio::test]
    async fn test_remove_and_capacity() {
        let cache = SessionCache::new(0);
        assert_eq!(cache.capacity().await, 1);

        cache.insert_if_absent("s1", Arc::new(index("a"))).await;
        assert!(cache.remove("s1").await);
        assert!(!cache.remove("s1").await);
        assert!(cache.is_empty().await);
    }
}
