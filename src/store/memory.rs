//! 进程内存储实现
//!
//! 适用于单实例部署和测试。过期基于 `tokio::time::Instant`，
//! 因此测试中可以暂停并推进时钟。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{RawListener, StoreClient, Ttl};
use crate::error::StoreError;
use crate::utils::mutex_lock;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    listeners: Mutex<HashMap<String, RawListener>>,
    unavailable: AtomicBool,
    stalled: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可达：所有操作立即返回错误
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 模拟存储无响应：所有操作挂起，直到调用方超时
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// 剩余存活时间，键不存在或没有过期时间时返回 `None`
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, "memory.ttl");
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at - now)
    }

    pub fn has_listener(&self, channel: &str) -> bool {
        mutex_lock(&self.listeners, "memory.has_listener").contains_key(channel)
    }

    async fn check_available(&self) -> Result<(), StoreError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available().await?;
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, "memory.get");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Ttl>) -> Result<(), StoreError> {
        self.check_available().await?;
        let entry = Entry {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl.as_duration()),
        };
        mutex_lock(&self.entries, "memory.set").insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check_available().await?;
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, "memory.delete");
        let deleted = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(deleted as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available().await?;
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, "memory.exists");
        Ok(entries.get(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Ttl) -> Result<u64, StoreError> {
        self.check_available().await?;
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, "memory.incr");

        let (current, expires_at) = match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .ok_or_else(|| {
                        StoreError::Rejected(format!("value at `{}` is not an integer", key))
                    })?;
                (current, entry.expires_at)
            }
            _ => (0, None),
        };

        let count = current + 1;
        let expires_at = expires_at.or_else(|| Some(now + ttl.as_duration()));
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_available().await?;
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, "memory.scan");
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<u64, StoreError> {
        self.check_available().await?;
        let listener = mutex_lock(&self.listeners, "memory.publish")
            .get(channel)
            .map(Arc::clone);
        match listener {
            Some(listener) => {
                listener(payload);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn subscribe_raw(&self, channel: &str, listener: RawListener) -> Result<(), StoreError> {
        self.check_available().await?;
        mutex_lock(&self.listeners, "memory.subscribe").insert(channel.to_string(), listener);
        Ok(())
    }

    async fn unsubscribe_raw(&self, channel: &str) -> Result<(), StoreError> {
        self.check_available().await?;
        mutex_lock(&self.listeners, "memory.unsubscribe").remove(channel);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available().await
    }

    async fn close(&self) {
        mutex_lock(&self.listeners, "memory.close").clear();
    }
}

/// Redis 风格的 glob 匹配，支持 `*`、`?`、`[...]` 字符类和 `\` 转义
fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0, 0);
    // 最近一个 `*` 的位置，以及它当前吞掉的键位置
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
            continue;
        }
        if pi < p.len() {
            let (matched, width) = match p[pi] {
                '?' => (true, 1),
                '[' => class_match(&p, pi, k[ki]).unwrap_or(('[' == k[ki], 1)),
                '\\' if pi + 1 < p.len() => (p[pi + 1] == k[ki], 2),
                c => (c == k[ki], 1),
            };
            if matched {
                pi += width;
                ki += 1;
                continue;
            }
        }
        match star {
            Some((sp, sk)) => {
                pi = sp + 1;
                ki = sk + 1;
                star = Some((sp, sk + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// 匹配 `p[open]` 开始的字符类，返回是否匹配以及字符类占用的模式长度
///
/// 支持 `^` 取反、`a-z` 区间和 `\` 转义；没有闭合的 `]` 时返回 `None`，按字面量 `[` 处理。
fn class_match(p: &[char], open: usize, c: char) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negate = p.get(i) == Some(&'^');
    if negate {
        i += 1;
    }
    let mut matched = false;
    while i < p.len() {
        match p[i] {
            ']' => return Some((matched != negate, i + 1 - open)),
            '\\' if i + 1 < p.len() => {
                matched |= p[i + 1] == c;
                i += 2;
            }
            lo if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' => {
                let hi = p[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            other => {
                matched |= other == c;
                i += 1;
            }
        }
    }
    None
}
