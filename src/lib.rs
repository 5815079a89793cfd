use std::sync::Arc;

use cache::{NotificationChannel, RateLimiter, ResponseCache, SessionStore};
use config::{Config, StoreBackend};
use error::StoreError;
use store::{MemoryStore, RedisStore, Store, StoreClient};

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub limiter: RateLimiter,
    pub cache: ResponseCache,
    pub sessions: SessionStore,
    pub notifier: NotificationChannel,
}

impl AppState {
    /// 所有组件共享同一个存储句柄
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            config,
            limiter: RateLimiter::new(store.clone()),
            cache: ResponseCache::new(store.clone()),
            sessions: SessionStore::new(store.clone()),
            notifier: NotificationChannel::new(store.clone()),
            store,
        }
    }
}

/// 按配置建立存储连接
pub async fn connect_store(config: &Config) -> Result<Store, StoreError> {
    let client: Arc<dyn StoreClient> = match config.store_backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, state is not shared between processes");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(Store::new(client, config.store_timeout()))
}
