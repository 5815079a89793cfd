//! 键值存储客户端
//!
//! `StoreClient` 是对后端存储的最小抽象，不包含任何业务逻辑。
//! 上层组件只持有 `Store` 句柄，句柄为每个操作加上超时限制。

use std::future::Future;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ConfigError, StoreError};

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// 过期时间（秒），保证大于零
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(NonZeroU64);

impl Ttl {
    pub fn from_secs(secs: u64) -> Result<Self, ConfigError> {
        NonZeroU64::new(secs)
            .map(Ttl)
            .ok_or(ConfigError::NonPositive("ttl"))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.get()
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0.get())
    }
}

/// 订阅回调，收到的是原始消息体
pub type RawListener = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// `ttl` 为 `None` 时永不过期
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Ttl>) -> Result<(), StoreError>;

    /// 返回实际删除的键数量
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// 原子自增并返回新值；键没有过期时间时（即窗口刚创建）设置 `ttl`
    async fn incr_with_expiry(&self, key: &str, ttl: Ttl) -> Result<u64, StoreError>;

    /// 按 glob 模式列出键，不保证原子性
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// 返回收到消息的订阅者数量
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<u64, StoreError>;

    /// 每个频道只保留一个监听器，重复订阅会替换旧的监听器
    async fn subscribe_raw(&self, channel: &str, listener: RawListener) -> Result<(), StoreError>;

    async fn unsubscribe_raw(&self, channel: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// 释放订阅连接等资源
    async fn close(&self) {}
}

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Connected,
    Disconnected,
}

/// 共享的存储句柄，克隆开销很小
#[derive(Clone)]
pub struct Store {
    client: Arc<dyn StoreClient>,
    timeout: Duration,
}

impl Store {
    pub fn new(client: Arc<dyn StoreClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.bounded("get", self.client.get(key)).await
    }

    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.bounded("set", self.client.set(key, value, None)).await
    }

    pub async fn set_ex(&self, key: &str, value: &[u8], ttl: Ttl) -> Result<(), StoreError> {
        self.bounded("set_ex", self.client.set(key, value, Some(ttl)))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let keys = [key.to_string()];
        self.bounded("delete", self.client.delete(&keys)).await
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("delete", self.client.delete(keys)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded("exists", self.client.exists(key)).await
    }

    pub async fn incr_with_expiry(&self, key: &str, ttl: Ttl) -> Result<u64, StoreError> {
        self.bounded("incr", self.client.incr_with_expiry(key, ttl))
            .await
    }

    pub async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("scan", self.client.scan(pattern)).await
    }

    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<u64, StoreError> {
        self.bounded("publish", self.client.publish(channel, payload))
            .await
    }

    pub async fn subscribe_raw(
        &self,
        channel: &str,
        listener: RawListener,
    ) -> Result<(), StoreError> {
        self.bounded("subscribe", self.client.subscribe_raw(channel, listener))
            .await
    }

    pub async fn unsubscribe_raw(&self, channel: &str) -> Result<(), StoreError> {
        self.bounded("unsubscribe", self.client.unsubscribe_raw(channel))
            .await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", self.client.ping()).await
    }

    pub async fn health(&self) -> Health {
        match self.ping().await {
            Ok(()) => Health::Connected,
            Err(e) => {
                tracing::warn!(error = %e, "Store health check failed");
                Health::Disconnected
            }
        }
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}
