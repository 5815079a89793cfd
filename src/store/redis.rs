use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink};
use redis::{AsyncCommands, Client as RedisClient, Script};
use tokio::task::JoinHandle;

use super::{RawListener, StoreClient, Ttl};
use crate::error::StoreError;
use crate::utils::mutex_lock;

/// 自增计数器，仅在键没有过期时间时设置过期时间（固定窗口）
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// 每次 SCAN 的批量大小
const SCAN_BATCH: usize = 200;

type Listeners = Arc<Mutex<HashMap<String, RawListener>>>;

/// 订阅专用连接，drop 时终止监听任务
struct SubscriptionListener {
    sink: PubSubSink,
    task: JoinHandle<()>,
}

impl SubscriptionListener {
    /// 连接被服务端关闭后监听任务会退出
    fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SubscriptionListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Redis 存储实现
///
/// 普通命令共享一条多路复用连接；订阅使用另一条专用连接，
/// 在第一次订阅时建立，最后一个频道退订或关闭时释放。
pub struct RedisStore {
    client: RedisClient,
    conn: MultiplexedConnection,
    incr_script: Script,
    listeners: Listeners,
    subscription: tokio::sync::Mutex<Option<SubscriptionListener>>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = RedisClient::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("Connected to redis");

        Ok(Self {
            client,
            conn,
            incr_script: Script::new(INCR_WITH_EXPIRY),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            subscription: tokio::sync::Mutex::new(None),
        })
    }

    async fn open_subscription(&self) -> Result<SubscriptionListener, StoreError> {
        let pubsub = self.client.get_async_pubsub().await?;
        let (sink, mut stream) = pubsub.split();
        let listeners = Arc::clone(&self.listeners);

        let task = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let listener = mutex_lock(&listeners, "redis.dispatch")
                    .get(&channel)
                    .map(Arc::clone);
                match listener {
                    Some(listener) => listener(msg.get_payload_bytes()),
                    None => tracing::debug!(channel = %channel, "Dropping message without listener"),
                }
            }
            tracing::warn!("Pub/sub stream closed, connection will be reopened on next subscribe");
        });

        tracing::info!("Opened dedicated pub/sub connection");
        Ok(SubscriptionListener { sink, task })
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Ttl>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: u64 = conn.del(keys).await?;
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Ttl) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .incr_script
            .key(key)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let receivers: u64 = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn subscribe_raw(&self, channel: &str, listener: RawListener) -> Result<(), StoreError> {
        let mut subscription = self.subscription.lock().await;
        if subscription.as_ref().is_none_or(SubscriptionListener::is_closed) {
            let mut fresh = self.open_subscription().await?;
            // 旧连接断开时把已有频道重新订阅到新连接上
            let channels: Vec<String> = mutex_lock(&self.listeners, "redis.resubscribe")
                .keys()
                .filter(|existing| existing.as_str() != channel)
                .cloned()
                .collect();
            for existing in &channels {
                fresh.sink.subscribe(existing).await?;
            }
            if !channels.is_empty() {
                tracing::info!(count = channels.len(), "Resubscribed channels on new pub/sub connection");
            }
            *subscription = Some(fresh);
        }

        mutex_lock(&self.listeners, "redis.subscribe").insert(channel.to_string(), listener);

        if let Some(active) = subscription.as_mut() {
            if let Err(e) = active.sink.subscribe(channel).await {
                mutex_lock(&self.listeners, "redis.subscribe").remove(channel);
                return Err(e.into());
            }
        }
        tracing::debug!(channel = %channel, "Subscribed");
        Ok(())
    }

    async fn unsubscribe_raw(&self, channel: &str) -> Result<(), StoreError> {
        let mut subscription = self.subscription.lock().await;
        let remaining = {
            let mut listeners = mutex_lock(&self.listeners, "redis.unsubscribe");
            listeners.remove(channel);
            listeners.len()
        };

        let result = match subscription.as_mut() {
            Some(active) if !active.is_closed() => active.sink.unsubscribe(channel).await,
            _ => Ok(()),
        };
        if remaining == 0 && subscription.take().is_some() {
            // 没有频道了，不论退订结果如何都释放订阅连接
            tracing::info!("Closed dedicated pub/sub connection");
        }
        result?;
        tracing::debug!(channel = %channel, "Unsubscribed");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) {
        mutex_lock(&self.listeners, "redis.close").clear();
        if self.subscription.lock().await.take().is_some() {
            tracing::info!("Closed dedicated pub/sub connection");
        }
    }
}
