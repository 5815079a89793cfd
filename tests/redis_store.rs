//! 需要真实的 Redis，未设置 `REDIS_URL` 时跳过。

use std::sync::Arc;
use std::time::Duration;

use kvguard::store::{RedisStore, StoreClient, Ttl};
use redis::aio::MultiplexedConnection;

struct Harness {
    store: RedisStore,
    conn: MultiplexedConnection,
    prefix: String,
}

async fn harness() -> Option<Harness> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping redis tests");
        return None;
    };
    let store = RedisStore::connect(&url).await.unwrap();
    let conn = redis::Client::open(url)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    Some(Harness {
        store,
        conn,
        prefix: format!("kvguard-test:{}", uuid::Uuid::new_v4()),
    })
}

impl Harness {
    async fn ttl_of(&mut self, key: &str) -> i64 {
        redis::cmd("TTL").arg(key).query_async(&mut self.conn).await.unwrap()
    }

    async fn subscriber_count(&mut self, channel: &str) -> u64 {
        let (_, count): (String, u64) = redis::cmd("PUBSUB")
            .arg("NUMSUB")
            .arg(channel)
            .query_async(&mut self.conn)
            .await
            .unwrap();
        count
    }

    /// 服务端异步处理退订，轮询直到计数符合预期
    async fn wait_for_subscribers(&mut self, channel: &str, expected: u64) -> u64 {
        let mut count = self.subscriber_count(channel).await;
        for _ in 0..40 {
            if count == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
            count = self.subscriber_count(channel).await;
        }
        count
    }

    async fn cleanup(&mut self) {
        let keys = self.store.scan(&format!("{}*", self.prefix)).await.unwrap();
        self.store.delete(&keys).await.unwrap();
    }
}

#[tokio::test]
async fn incr_sets_expiry_only_on_window_creation() {
    let Some(mut h) = harness().await else { return };
    let key = format!("{}:counter", h.prefix);
    let window = Ttl::from_secs(100).unwrap();

    assert_eq!(h.store.incr_with_expiry(&key, window).await.unwrap(), 1);
    let ttl = h.ttl_of(&key).await;
    assert!(ttl > 0 && ttl <= 100, "ttl = {ttl}");

    // 缩短过期时间后再次自增，不会被重新设置为窗口长度
    let _: i64 = redis::cmd("EXPIRE")
        .arg(&key)
        .arg(5)
        .query_async(&mut h.conn)
        .await
        .unwrap();
    assert_eq!(h.store.incr_with_expiry(&key, window).await.unwrap(), 2);
    assert!(h.ttl_of(&key).await <= 5);

    // 没有过期时间的计数器会补上
    let _: i64 = redis::cmd("PERSIST")
        .arg(&key)
        .query_async(&mut h.conn)
        .await
        .unwrap();
    assert_eq!(h.store.incr_with_expiry(&key, window).await.unwrap(), 3);
    assert!(h.ttl_of(&key).await > 5);

    h.cleanup().await;
}

#[tokio::test]
async fn scan_walks_every_cursor_page() {
    let Some(mut h) = harness().await else { return };
    let ttl = Ttl::from_secs(60).unwrap();
    for i in 0..450 {
        h.store
            .set(&format!("{}:item:{i}", h.prefix), b"x", Some(ttl))
            .await
            .unwrap();
    }
    h.store
        .set(&format!("{}:other", h.prefix), b"x", Some(ttl))
        .await
        .unwrap();

    let mut keys = h.store.scan(&format!("{}:item:*", h.prefix)).await.unwrap();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 450);

    h.cleanup().await;
}

#[tokio::test]
async fn pubsub_connection_is_released_on_last_unsubscribe_and_close() {
    let Some(mut h) = harness().await else { return };
    let first = format!("{}:events", h.prefix);
    let second = format!("{}:audit", h.prefix);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let listener = Arc::new(move |payload: &[u8]| {
        let _ = tx.send(payload.to_vec());
    });
    h.store.subscribe_raw(&first, listener.clone()).await.unwrap();
    h.store.subscribe_raw(&second, listener).await.unwrap();
    assert_eq!(h.wait_for_subscribers(&first, 1).await, 1);

    assert_eq!(h.store.publish(&first, b"hello").await.unwrap(), 1);
    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"hello");

    // 还有频道时保留连接
    h.store.unsubscribe_raw(&first).await.unwrap();
    assert_eq!(h.wait_for_subscribers(&first, 0).await, 0);
    assert_eq!(h.subscriber_count(&second).await, 1);

    h.store.unsubscribe_raw(&second).await.unwrap();
    assert_eq!(h.wait_for_subscribers(&second, 0).await, 0);

    // 重新订阅会建立新连接，close 时释放
    h.store
        .subscribe_raw(&first, Arc::new(|_: &[u8]| {}))
        .await
        .unwrap();
    assert_eq!(h.wait_for_subscribers(&first, 1).await, 1);
    h.store.close().await;
    assert_eq!(h.wait_for_subscribers(&first, 0).await, 0);
    assert_eq!(h.store.publish(&first, b"late").await.unwrap(), 0);
}
