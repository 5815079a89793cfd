use std::future::Future;

use serde::{Serialize, de::DeserializeOwned};

use crate::cache::keys::cache_key;
use crate::cache::models::CacheEntry;
use crate::error::StoreError;
use crate::store::{Store, Ttl};

/// 响应缓存操作
///
/// 命中时直接返回缓存值，未命中时执行计算并写回。
/// 读失败视为未命中，写失败只记录日志，不影响返回结果。
#[derive(Clone)]
pub struct ResponseCache {
    store: Store,
}

impl ResponseCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// 读取缓存，未命中时调用 `produce` 并写回
    ///
    /// `produce` 的错误原样返回，且不会被缓存。
    pub async fn get_or_produce<T, E, F, Fut>(&self, key: &str, ttl: Ttl, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.lookup(key).await {
            return Ok(hit);
        }

        let value = produce().await?;
        self.put(key, &value, ttl).await;
        Ok(value)
    }

    /// 读取缓存值；不存在、格式错误或存储不可用时返回 `None`
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let redis_key = cache_key(key);
        let raw = match self.store.get(&redis_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %redis_key, outcome = "miss", "Cache lookup");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %redis_key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry<T>>(&raw) {
            Ok(entry) => {
                tracing::debug!(key = %redis_key, outcome = "hit", "Cache lookup");
                Some(entry.value)
            }
            Err(e) => {
                tracing::warn!(key = %redis_key, error = %e, "Malformed cache entry, treating as miss");
                None
            }
        }
    }

    /// 写入缓存，返回是否写入成功
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Ttl) -> bool {
        let redis_key = cache_key(key);
        let entry = CacheEntry {
            value,
            ttl_secs: ttl.as_secs(),
            stored_at: chrono::Utc::now().timestamp(),
        };

        let result = match serde_json::to_vec(&entry) {
            Ok(bytes) => self.store.set_ex(&redis_key, &bytes, ttl).await,
            Err(e) => Err(StoreError::from(e)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %redis_key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// 删除单个缓存条目，返回删除数量
    pub async fn invalidate(&self, key: &str) -> Result<u64, StoreError> {
        let deleted = self.store.delete(&cache_key(key)).await?;
        tracing::debug!(key = %key, deleted, "Cache invalidated");
        Ok(deleted)
    }

    /// 按模式删除缓存条目
    ///
    /// 先扫描再删除，不是原子操作：扫描和删除之间被其他请求重新写入的键可能保留下来。
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let keys = self.store.scan(&cache_key(pattern)).await?;
        let deleted = self.store.delete_many(&keys).await?;
        tracing::debug!(pattern = %pattern, scanned = keys.len(), deleted, "Cache pattern invalidated");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::store::{MemoryStore, StoreClient};

    fn cache() -> (ResponseCache, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::new());
        let store = Store::new(backend.clone(), Duration::from_millis(100));
        (ResponseCache::new(store), backend)
    }

    fn ttl(secs: u64) -> Ttl {
        Ttl::from_secs(secs).unwrap()
    }

    async fn produce_counted(
        cache: &ResponseCache,
        key: &str,
        calls: &AtomicUsize,
    ) -> Result<String, Infallible> {
        cache
            .get_or_produce(key, ttl(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            })
            .await
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (cache, _) = cache();
        let calls = AtomicUsize::new(0);

        assert_eq!(produce_counted(&cache, "GET:/a", &calls).await.unwrap(), "fresh");
        assert_eq!(produce_counted(&cache, "GET:/a", &calls).await.unwrap(), "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let (cache, _) = cache();
        let calls = AtomicUsize::new(0);

        produce_counted(&cache, "GET:/a", &calls).await.unwrap();
        assert_eq!(cache.invalidate("GET:/a").await.unwrap(), 1);
        produce_counted(&cache, "GET:/a", &calls).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pattern_invalidation_only_touches_matching_keys() {
        let (cache, backend) = cache();
        cache.put("GET:/users/1", &1, ttl(60)).await;
        cache.put("GET:/users/2", &2, ttl(60)).await;
        cache.put("GET:/groups/1", &3, ttl(60)).await;
        backend.set("session:keep", b"{}", None).await.unwrap();

        assert_eq!(cache.invalidate_pattern("GET:/users/*").await.unwrap(), 2);
        assert_eq!(cache.lookup::<i32>("GET:/users/1").await, None);
        assert_eq!(cache.lookup::<i32>("GET:/groups/1").await, Some(3));
        assert!(backend.exists("session:keep").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_with_ttl() {
        let (cache, _) = cache();
        cache.put("GET:/a", &"v", ttl(5)).await;
        assert_eq!(cache.lookup::<String>("GET:/a").await.as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.lookup::<String>("GET:/a").await, None);
    }

    #[tokio::test]
    async fn producer_errors_are_not_cached() {
        let (cache, _) = cache();
        let failed: Result<String, &str> = cache
            .get_or_produce("GET:/a", ttl(60), || async { Err("boom") })
            .await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.lookup::<String>("GET:/a").await, None);
    }

    #[tokio::test]
    async fn malformed_entry_is_a_miss() {
        let (cache, backend) = cache();
        backend.set("cache:GET:/a", b"\xff\x00garbage", None).await.unwrap();

        let calls = AtomicUsize::new(0);
        assert_eq!(produce_counted(&cache, "GET:/a", &calls).await.unwrap(), "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // 重新计算后覆盖了损坏的条目
        assert_eq!(cache.lookup::<String>("GET:/a").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn entry_records_ttl() {
        let (cache, backend) = cache();
        cache.put("GET:/a", &"v", ttl(42)).await;
        let raw = backend.get("cache:GET:/a").await.unwrap().unwrap();
        let entry: CacheEntry<String> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(entry.ttl_secs, 42);
        assert_eq!(entry.value, "v");
    }

    #[tokio::test]
    async fn unavailable_store_always_produces() {
        let (cache, backend) = cache();
        backend.set_unavailable(true);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            assert_eq!(produce_counted(&cache, "GET:/a", &calls).await.unwrap(), "fresh");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!cache.put("GET:/a", &"v", ttl(60)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_always_produces() {
        let (cache, backend) = cache();
        backend.set_stalled(true);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            assert_eq!(produce_counted(&cache, "GET:/a", &calls).await.unwrap(), "fresh");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
