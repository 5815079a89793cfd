use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::auth::AuthenticatedUser;
use crate::cache::{Admission, RateLimitPolicy, RateLimiter};
use crate::error::AppError;

const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

pub type IdentityExtractor = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// 调用方身份提取规则
#[derive(Clone)]
pub enum IdentityRule {
    /// 按客户端 IP
    ClientIp,
    /// 按认证用户，匿名请求退回到客户端 IP
    User,
    /// 自定义提取，返回 `None` 时退回到客户端 IP
    Custom(IdentityExtractor),
}

/// 限流中间件配置
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: RateLimiter,
    scope: String,
    policy: RateLimitPolicy,
    identity: IdentityRule,
}

impl RateLimitGuard {
    pub fn new(limiter: RateLimiter, scope: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            scope: scope.into(),
            policy,
            identity: IdentityRule::ClientIp,
        }
    }

    pub fn by_user(mut self) -> Self {
        self.identity = IdentityRule::User;
        self
    }

    pub fn by_key<F>(mut self, extract: F) -> Self
    where
        F: Fn(&Request<Body>) -> Option<String> + Send + Sync + 'static,
    {
        self.identity = IdentityRule::Custom(Arc::new(extract));
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn identify(&self, req: &Request<Body>) -> String {
        let identity = match &self.identity {
            IdentityRule::ClientIp => None,
            IdentityRule::User => req
                .extensions()
                .get::<AuthenticatedUser>()
                .map(|user| format!("user:{}", user.0)),
            IdentityRule::Custom(extract) => extract(req),
        };
        identity.unwrap_or_else(|| format!("ip:{}", client_ip(req)))
    }
}

/// 获取客户端 IP：优先 `x-real-ip`，其次 `x-forwarded-for` 的第一个地址，最后是连接地址
pub fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

fn set_limit_headers(response: &mut Response, admission: &Admission) {
    let headers = response.headers_mut();
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(admission.remaining()));
}

pub async fn rate_limit(
    State(guard): State<Arc<RateLimitGuard>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = guard.identify(&req);
    let admission = guard.limiter.check(&guard.scope, &identity, &guard.policy).await;

    if !admission.admitted {
        tracing::warn!(scope = %guard.scope, identity = %identity, count = admission.count, "Rate limit exceeded");
        let mut response = AppError::TooManyRequests {
            limit: guard.policy.limit(),
            window_secs: guard.policy.window_secs(),
        }
        .into_response();
        set_limit_headers(&mut response, &admission);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(guard.policy.window_secs()));
        return response;
    }

    let mut response = next.run(req).await;
    if !admission.degraded {
        set_limit_headers(&mut response, &admission);
    }
    response
}
