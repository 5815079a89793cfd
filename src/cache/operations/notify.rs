use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::store::{RawListener, Store};
use crate::utils::mutex_lock;

/// 收到的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl Notification {
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// 订阅标识，用于单独移除某个处理器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Registry = Arc<Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>>;

/// 已在存储上注册监听器的频道；挂载和卸载都在这把锁内完成
type Attached = Arc<tokio::sync::Mutex<HashSet<String>>>;

/// 发布/订阅通知通道
///
/// 每个频道只向存储注册一个监听器，由它按注册顺序同步分发给本地所有处理器。
/// 最后一个处理器移除时同时退订底层频道。投递至多一次，没有订阅者时消息直接丢弃。
#[derive(Clone)]
pub struct NotificationChannel {
    store: Store,
    registry: Registry,
    attached: Attached,
    next_id: Arc<AtomicU64>,
}

impl NotificationChannel {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            registry: Arc::new(Mutex::new(HashMap::new())),
            attached: Arc::new(tokio::sync::Mutex::new(HashSet::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// 发布消息，返回收到消息的订阅者数量；发布失败时返回 0
    pub async fn publish(&self, channel: &str, message: impl AsRef<[u8]>) -> u64 {
        match self.store.publish(channel, message.as_ref()).await {
            Ok(receivers) => receivers,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Publish failed, message dropped");
                0
            }
        }
    }

    /// 注册处理器；频道还没有底层监听器时先挂载
    pub async fn subscribe<F>(&self, channel: &str, handler: F) -> Result<SubscriptionId, StoreError>
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(handler);

        let mut attached = self.attached.lock().await;
        mutex_lock(&self.registry, "notify.subscribe")
            .entry(channel.to_string())
            .or_default()
            .push((id, handler));

        if !attached.contains(channel) {
            if let Err(e) = self.store.subscribe_raw(channel, self.fan_out(channel)).await {
                self.remove_handler(channel, id);
                return Err(e);
            }
            attached.insert(channel.to_string());
            tracing::debug!(channel = %channel, "Attached channel listener");
        }
        Ok(id)
    }

    /// 移除频道上的所有处理器并退订
    pub async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError> {
        let mut attached = self.attached.lock().await;
        mutex_lock(&self.registry, "notify.unsubscribe").remove(channel);
        self.detach(&mut attached, channel).await
    }

    /// 移除单个处理器，频道上没有处理器时退订
    pub async fn unsubscribe_handler(&self, id: SubscriptionId) -> Result<(), StoreError> {
        let mut attached = self.attached.lock().await;
        let channel = {
            let registry = mutex_lock(&self.registry, "notify.unsubscribe_handler");
            registry
                .iter()
                .find(|(_, handlers)| handlers.iter().any(|(hid, _)| *hid == id))
                .map(|(channel, _)| channel.clone())
        };

        match channel {
            Some(channel) if self.remove_handler(&channel, id) => {
                self.detach(&mut attached, &channel).await
            }
            _ => Ok(()),
        }
    }

    /// 卸载底层监听器。无论退订是否成功都清除挂载标记，下次订阅会重新挂载
    async fn detach(&self, attached: &mut HashSet<String>, channel: &str) -> Result<(), StoreError> {
        if !attached.remove(channel) {
            return Ok(());
        }
        self.store.unsubscribe_raw(channel).await?;
        tracing::debug!(channel = %channel, "Detached channel listener");
        Ok(())
    }

    /// 本地处理器数量
    pub fn handler_count(&self, channel: &str) -> usize {
        mutex_lock(&self.registry, "notify.handler_count")
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// 移除处理器，返回频道是否因此变空
    fn remove_handler(&self, channel: &str, id: SubscriptionId) -> bool {
        let mut registry = mutex_lock(&self.registry, "notify.remove_handler");
        let Some(handlers) = registry.get_mut(channel) else {
            return false;
        };
        handlers.retain(|(hid, _)| *hid != id);
        if handlers.is_empty() {
            registry.remove(channel);
            true
        } else {
            false
        }
    }

    fn fan_out(&self, channel: &str) -> RawListener {
        let registry = Arc::clone(&self.registry);
        let channel = channel.to_string();
        Arc::new(move |payload: &[u8]| {
            // 先复制处理器列表，处理器内部可以再订阅或退订
            let handlers: Vec<Handler> = mutex_lock(&registry, "notify.fan_out")
                .get(&channel)
                .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default();

            let notification = Notification {
                channel: channel.clone(),
                payload: payload.to_vec(),
            };
            for handler in handlers {
                handler(&notification);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn channel() -> (NotificationChannel, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::new());
        let store = Store::new(backend.clone(), Duration::from_millis(100));
        (NotificationChannel::new(store), backend)
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |tag: &str| -> Handler {
            let sink = Arc::clone(&sink);
            let tag = tag.to_string();
            Arc::new(move |n: &Notification| {
                sink.lock()
                    .unwrap()
                    .push(format!("{}:{}", tag, n.payload_str().unwrap_or_default()));
            })
        };
        (log, make)
    }

    #[tokio::test]
    async fn publish_without_subscribers_returns_zero() {
        let (notifier, _) = channel();
        let (log, make) = recorder();
        let handler = make("other");
        notifier
            .subscribe("other", move |n: &Notification| handler(n))
            .await
            .unwrap();

        assert_eq!(notifier.publish("events", "hello").await, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_handler_receives_payload_once() {
        let (notifier, _) = channel();
        let (log, make) = recorder();
        let handler = make("h");
        notifier
            .subscribe("events", move |n: &Notification| handler(n))
            .await
            .unwrap();

        assert_eq!(notifier.publish("events", "hello").await, 1);
        assert_eq!(*log.lock().unwrap(), vec!["h:hello".to_string()]);
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let (notifier, backend) = channel();
        let (log, make) = recorder();
        for tag in ["first", "second", "third"] {
            let handler = make(tag);
            notifier
                .subscribe("events", move |n: &Notification| handler(n))
                .await
                .unwrap();
        }

        // 三个处理器共用一个底层监听器
        assert_eq!(notifier.publish("events", "x").await, 1);
        assert!(backend.has_listener("events"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:x".to_string(), "second:x".to_string(), "third:x".to_string()]
        );
    }

    #[tokio::test]
    async fn last_handler_removal_detaches_listener() {
        let (notifier, backend) = channel();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        let id_a = notifier
            .subscribe("events", move |n: &Notification| a(n))
            .await
            .unwrap();
        let id_b = notifier
            .subscribe("events", move |n: &Notification| b(n))
            .await
            .unwrap();

        notifier.unsubscribe_handler(id_a).await.unwrap();
        assert!(backend.has_listener("events"));
        notifier.publish("events", "1").await;

        notifier.unsubscribe_handler(id_b).await.unwrap();
        assert!(!backend.has_listener("events"));
        assert_eq!(notifier.publish("events", "2").await, 0);

        assert_eq!(*log.lock().unwrap(), vec!["b:1".to_string()]);
        assert_eq!(notifier.handler_count("events"), 0);
    }

    #[tokio::test]
    async fn unsubscribe_drops_every_handler() {
        let (notifier, backend) = channel();
        notifier.subscribe("events", |_: &Notification| {}).await.unwrap();
        notifier.subscribe("events", |_: &Notification| {}).await.unwrap();
        assert_eq!(notifier.handler_count("events"), 2);

        notifier.unsubscribe("events").await.unwrap();
        assert_eq!(notifier.handler_count("events"), 0);
        assert!(!backend.has_listener("events"));
    }

    #[tokio::test]
    async fn failed_subscribe_leaves_no_handler() {
        let (notifier, backend) = channel();
        backend.set_unavailable(true);

        assert!(notifier.subscribe("events", |_: &Notification| {}).await.is_err());
        assert_eq!(notifier.handler_count("events"), 0);
        assert_eq!(notifier.publish("events", "x").await, 0);

        // 存储恢复后重新挂载
        backend.set_unavailable(false);
        notifier.subscribe("events", |_: &Notification| {}).await.unwrap();
        assert!(backend.has_listener("events"));
        assert_eq!(notifier.publish("events", "x").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_subscribe_attaches_after_failed_attach() {
        let (notifier, backend) = channel();
        let (log, make) = recorder();
        backend.set_stalled(true);

        let first = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.subscribe("events", |_: &Notification| {}).await })
        };
        // 第一个订阅挂起在存储调用上
        tokio::task::yield_now().await;

        let second = {
            let notifier = notifier.clone();
            let handler = make("second");
            tokio::spawn(async move {
                notifier
                    .subscribe("events", move |n: &Notification| handler(n))
                    .await
            })
        };
        tokio::task::yield_now().await;
        backend.set_stalled(false);

        assert!(first.await.unwrap().is_err());
        assert!(second.await.unwrap().is_ok());

        assert_eq!(notifier.handler_count("events"), 1);
        assert!(backend.has_listener("events"));
        assert_eq!(notifier.publish("events", "x").await, 1);
        assert_eq!(*log.lock().unwrap(), vec!["second:x".to_string()]);
    }

    #[tokio::test]
    async fn resubscribe_after_detach_reattaches() {
        let (notifier, backend) = channel();
        let id = notifier.subscribe("events", |_: &Notification| {}).await.unwrap();
        notifier.unsubscribe_handler(id).await.unwrap();
        assert!(!backend.has_listener("events"));

        notifier.subscribe("events", |_: &Notification| {}).await.unwrap();
        assert!(backend.has_listener("events"));
        assert_eq!(notifier.publish("events", "x").await, 1);
    }
}
