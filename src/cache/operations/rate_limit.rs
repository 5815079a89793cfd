use std::time::Duration;

use crate::cache::keys::rate_limit_key;
use crate::error::ConfigError;
use crate::store::{Store, Ttl};

/// 限流策略：每个窗口最多 `limit` 次请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u32,
    window: Ttl,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window_secs: u64) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::NonPositive("limit"));
        }
        let window = Ttl::from_secs(window_secs).map_err(|_| ConfigError::NonPositive("window"))?;
        Ok(Self { limit, window })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window.as_duration()
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}

/// 一次准入判断的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    /// 判断时窗口内的计数
    pub count: u64,
    pub limit: u32,
    pub window: Duration,
    /// 存储不可用，按放行处理
    pub degraded: bool,
}

impl Admission {
    pub fn remaining(&self) -> u64 {
        u64::from(self.limit).saturating_sub(self.count)
    }
}

/// 固定窗口限流器
///
/// 计数器在窗口内的第一次请求时创建，过期时间只在创建时设置，
/// 窗口结束后由存储过期删除，限流器从不主动删除计数器。
#[derive(Clone)]
pub struct RateLimiter {
    store: Store,
}

impl RateLimiter {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// 是否允许 `identity` 在 `scope` 下再发起一次请求
    pub async fn admit(&self, scope: &str, identity: &str, policy: &RateLimitPolicy) -> bool {
        self.check(scope, identity, policy).await.admitted
    }

    pub async fn check(&self, scope: &str, identity: &str, policy: &RateLimitPolicy) -> Admission {
        let key = rate_limit_key(scope, identity);
        let limit = u64::from(policy.limit);
        let decision = |admitted: bool, count: u64, degraded: bool| Admission {
            admitted,
            count,
            limit: policy.limit,
            window: policy.window(),
            degraded,
        };

        // 已经超限的调用方直接拒绝，不再增加计数
        match self.store.get(&key).await {
            Ok(raw) => {
                let current = parse_count(raw.as_deref());
                if current >= limit {
                    tracing::debug!(key = %key, count = current, "Rate limit exceeded");
                    return decision(false, current, false);
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limit read failed, admitting request");
                return decision(true, 0, true);
            }
        }

        match self.store.incr_with_expiry(&key, policy.window).await {
            Ok(count) => {
                let admitted = count <= limit;
                if !admitted {
                    tracing::debug!(key = %key, count, "Rate limit exceeded by concurrent request");
                }
                decision(admitted, count, false)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limit increment failed, admitting request");
                decision(true, 0, true)
            }
        }
    }

    /// 当前窗口内的计数，不存在或读取失败时为 0
    pub async fn current_count(&self, scope: &str, identity: &str) -> u64 {
        let key = rate_limit_key(scope, identity);
        match self.store.get(&key).await {
            Ok(raw) => parse_count(raw.as_deref()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read rate limit counter");
                0
            }
        }
    }
}

/// 计数器以十进制字符串保存；格式错误的值视为不存在
fn parse_count(raw: Option<&[u8]>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };
    match std::str::from_utf8(raw).ok().and_then(|s| s.trim().parse().ok()) {
        Some(count) => count,
        None => {
            tracing::warn!("Malformed rate limit counter, treating as zero");
            0
        }
    }
}
