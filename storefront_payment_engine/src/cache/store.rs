use std::{collections::HashMap, fmt::Display, future::Future, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    fresh_until: DateTime<Utc>,
    stale_until: DateTime<Utc>,
}

/// Freshness classification of a cache key, with no side effects. Exposed to HTTP clients via a response header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatus {
    pub has: bool,
    pub fresh: bool,
    pub stale: bool,
    pub expired: bool,
}

impl CacheStatus {
    pub fn label(&self) -> &'static str {
        if !self.has {
            "miss"
        } else if self.fresh {
            "fresh"
        } else if self.stale {
            "stale"
        } else {
            "expired"
        }
    }
}

/// A keyed in-process store with freshness/staleness windows and background refresh.
///
/// Values are cached JSON payloads. Entries are never evicted automatically; removal is only by explicit key or
/// prefix deletion ([`CacheStore::del`]) or process restart. Writers are last-writer-wins; there is no per-key
/// mutual exclusion, which is acceptable because producers are idempotent recomputations.
#[derive(Clone, Default)]
pub struct CacheStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored value if present, regardless of freshness. Does not mutate or evict.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).map(|e| e.value.clone())
    }

    /// Classify the freshness of `key` without side effects.
    pub async fn peek(&self, key: &str) -> CacheStatus {
        let now = Utc::now();
        match self.entries.read().await.get(key) {
            None => CacheStatus::default(),
            Some(entry) => CacheStatus {
                has: true,
                fresh: now <= entry.fresh_until,
                stale: now > entry.fresh_until && now <= entry.stale_until,
                expired: now > entry.stale_until,
            },
        }
    }

    /// Overwrite the entry for `key`. The fresh window ends at `now + ttl` and the stale window at `now + swr`.
    /// `swr` is clamped up to at least `ttl` so the entry invariant (`stale_until >= fresh_until`) always holds.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration, swr: Duration) {
        let now = Utc::now();
        let swr = swr.max(ttl);
        let entry = CacheEntry { value, fresh_until: now + ttl, stale_until: now + swr };
        self.entries.write().await.insert(key.to_string(), entry);
        trace!("♻️ Cached '{key}' (fresh {}s, stale {}s)", ttl.num_seconds(), swr.num_seconds());
    }

    /// Remove the exact key and every key sharing `key_or_prefix` as a prefix. Returns the number of entries
    /// removed. Used to invalidate after a write that changes the underlying data.
    pub async fn del(&self, key_or_prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(key_or_prefix));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("♻️ Invalidated {removed} cache entries under '{key_or_prefix}'");
        }
        removed
    }

    /// The primary read-through operation.
    ///
    /// * Cold or expired key: the producer runs inline; the caller waits on it and its failure propagates.
    /// * Fresh key: the stored value is returned immediately.
    /// * Stale key: the stored value is returned immediately and the producer is started in the background.
    ///   When it resolves the entry is overwritten with new windows; if it fails the stale entry is left
    ///   untouched and no retry is scheduled.
    ///
    /// Concurrent calls on the same stale or cold key may each invoke the producer independently — there is no
    /// request coalescing. Producers must be idempotent.
    pub async fn remember<F, Fut, E>(&self, key: &str, ttl: Duration, swr: Duration, producer: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let now = Utc::now();
        let cached = {
            let entries = self.entries.read().await;
            entries.get(key).map(|e| (e.value.clone(), e.fresh_until, e.stale_until))
        };
        match cached {
            Some((value, fresh_until, _)) if now <= fresh_until => {
                trace!("♻️ Fresh hit for '{key}'");
                Ok(value)
            },
            Some((value, _, stale_until)) if now <= stale_until => {
                trace!("♻️ Stale hit for '{key}'; refreshing in the background");
                let store = self.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    match producer().await {
                        Ok(fresh) => store.set(&key, fresh, ttl, swr).await,
                        Err(e) => debug!("♻️ Background refresh for '{key}' failed; keeping stale entry. {e}"),
                    }
                });
                Ok(value)
            },
            _ => {
                trace!("♻️ Cache miss for '{key}'; producing inline");
                let value = producer().await?;
                self.set(key, value.clone(), ttl, swr).await;
                Ok(value)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Clone, Error)]
    #[error("producer failed: {0}")]
    struct ProducerError(String);

    fn secs(s: i64) -> Duration {
        Duration::seconds(s)
    }

    fn millis(ms: i64) -> Duration {
        Duration::milliseconds(ms)
    }

    #[tokio::test]
    async fn unwritten_key_is_absent() {
        let cache = CacheStore::new();
        assert!(cache.get("never").await.is_none());
        let status = cache.peek("never").await;
        assert!(!status.has);
        assert_eq!(status.label(), "miss");
    }

    #[tokio::test]
    async fn set_then_get_is_fresh() {
        let cache = CacheStore::new();
        cache.set("k", json!({"v": 1}), secs(60), secs(300)).await;
        assert_eq!(cache.get("k").await, Some(json!({"v": 1})));
        let status = cache.peek("k").await;
        assert!(status.has && status.fresh);
        assert_eq!(status.label(), "fresh");
    }

    #[tokio::test]
    async fn swr_is_clamped_to_ttl() {
        let cache = CacheStore::new();
        // swr < ttl would violate the entry invariant; the store clamps it up.
        cache.set("k", json!(1), secs(60), secs(1)).await;
        let status = cache.peek("k").await;
        assert!(status.fresh);
        assert!(!status.expired);
    }

    #[tokio::test]
    async fn fresh_hit_does_not_invoke_producer() {
        let cache = CacheStore::new();
        cache.set("k", json!("cached"), secs(60), secs(300)).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = cache
            .remember("k", secs(60), secs(300), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProducerError>(json!("produced"))
            })
            .await
            .unwrap();
        assert_eq!(value, json!("cached"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cold_key_blocks_on_producer_and_stores() {
        let cache = CacheStore::new();
        let value = cache
            .remember("k", secs(60), secs(300), || async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok::<_, ProducerError>(json!("produced"))
            })
            .await
            .unwrap();
        assert_eq!(value, json!("produced"));
        assert_eq!(cache.get("k").await, Some(json!("produced")));
        assert!(cache.peek("k").await.fresh);
    }

    #[tokio::test]
    async fn cold_path_propagates_producer_failure_and_caches_nothing() {
        let cache = CacheStore::new();
        let err = cache
            .remember("k", secs(60), secs(300), || async { Err::<Value, _>(ProducerError("boom".into())) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "producer failed: boom");
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn stale_hit_returns_immediately_and_refreshes_in_background() {
        let cache = CacheStore::new();
        cache.set("k", json!("old"), millis(0), millis(60_000)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(cache.peek("k").await.label(), "stale");

        let value = cache
            .remember("k", secs(60), secs(300), || async { Ok::<_, ProducerError>(json!("new")) })
            .await
            .unwrap();
        // The stale value is served without waiting for the refresh.
        assert_eq!(value, json!("old"));

        // The background producer eventually overwrites the entry with fresh windows.
        let mut refreshed = false;
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if cache.get("k").await == Some(json!("new")) {
                refreshed = true;
                break;
            }
        }
        assert!(refreshed, "background refresh never landed");
        assert!(cache.peek("k").await.fresh);
    }

    #[tokio::test]
    async fn failed_background_refresh_keeps_stale_entry() {
        let cache = CacheStore::new();
        cache.set("k", json!("old"), millis(0), millis(60_000)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let value = cache
            .remember("k", secs(60), secs(300), || async { Err::<Value, _>(ProducerError("transient".into())) })
            .await
            .unwrap();
        assert_eq!(value, json!("old"));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(cache.get("k").await, Some(json!("old")));
    }

    #[tokio::test]
    async fn expired_key_blocks_on_producer() {
        let cache = CacheStore::new();
        cache.set("k", json!("old"), millis(0), millis(0)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(cache.peek("k").await.label(), "expired");

        let value = cache
            .remember("k", secs(60), secs(300), || async { Ok::<_, ProducerError>(json!("new")) })
            .await
            .unwrap();
        assert_eq!(value, json!("new"));
    }

    #[tokio::test]
    async fn concurrent_cold_reads_may_each_produce() {
        let cache = CacheStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..2 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .remember("k", secs(60), secs(300), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                        Ok::<_, ProducerError>(json!("v"))
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), json!("v"));
        }
        // No coalescing guarantee: the producer ran at least once and at most once per caller.
        let n = calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&n), "expected 1 or 2 producer runs, got {n}");
    }

    #[tokio::test]
    async fn del_removes_key_and_prefix_matches() {
        let cache = CacheStore::new();
        cache.set("order:1", json!(1), secs(60), secs(300)).await;
        cache.set("order:2", json!(2), secs(60), secs(300)).await;
        cache.set("orders:list", json!([]), secs(60), secs(300)).await;
        cache.set("customers:9", json!(9), secs(60), secs(300)).await;

        assert_eq!(cache.del("order:").await, 2);
        assert!(cache.get("order:1").await.is_none());
        assert!(cache.get("order:2").await.is_none());
        assert_eq!(cache.get("orders:list").await, Some(json!([])));
        assert_eq!(cache.del("orders:").await, 1);
        assert_eq!(cache.get("customers:9").await, Some(json!(9)));
        assert_eq!(cache.del("nothing").await, 0);
    }
}
