//! C2: Verification Cache. A process-local, bounded LRU keyed by
//! `CacheKey`. Hits are served with cost zeroed and `model_used` suffixed
//! `" (Cached)"`.

use lru::LruCache;
use tokio::sync::Mutex;

use crate::domain::{CacheKey, VerificationResult};

const DEFAULT_CAPACITY: usize = 1000;

pub struct VerificationCache {
    entries: Mutex<LruCache<CacheKey, VerificationResult>>,
}

impl VerificationCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<VerificationResult> {
        self.entries
            .lock()
            .await
            .get(key)
            .cloned()
            .map(VerificationResult::into_cached)
    }

    pub async fn set(&self, key: CacheKey, result: VerificationResult) {
        self.entries.lock().await.put(key, result);
    }
}

impl Default for VerificationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_hit_zeroes_cost_and_suffixes_model() {
        let cache = VerificationCache::new();
        let key = CacheKey("k".to_string());
        let result = VerificationResult {
            consistent: true,
            confidence: 0.9,
            reasoning: "r".into(),
            model_used: "gpt-4o-mini".into(),
            cost_usd: 0.42,
        };
        cache.set(key.clone(), result).await;

        let hit = cache.get(&key).await.expect("cache hit");
        assert_eq!(hit.cost_usd, 0.0);
        assert_eq!(hit.model_used, "gpt-4o-mini (Cached)");
    }

    #[tokio::test]
    async fn cache_is_idempotent_across_repeated_gets() {
        let cache = VerificationCache::new();
        let key = CacheKey("k".to_string());
        cache
            .set(
                key.clone(),
                VerificationResult {
                    consistent: true,
                    confidence: 1.0,
                    reasoning: "r".into(),
                    model_used: "m".into(),
                    cost_usd: 0.1,
                },
            )
            .await;

        let first = cache.get(&key).await.unwrap();
        let second = cache.get(&key).await.unwrap();
        assert_eq!(first.model_used, second.model_used);
        assert_eq!(first.cost_usd, second.cost_usd);
    }

    #[tokio::test]
    async fn cache_miss_returns_none() {
        let cache = VerificationCache::new();
        assert!(cache.get(&CacheKey("missing".into())).await.is_none());
    }
}
