use serde::{Deserialize, Serialize};

/// 缓存条目：缓存值以及写入时使用的过期时间
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub ttl_secs: u64,
    pub stored_at: i64, // Unix timestamp
}

/// 缓存的 HTTP 响应
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}
