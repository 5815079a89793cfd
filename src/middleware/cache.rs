use std::sync::Arc;

use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::cache::keys::request_key;
use crate::cache::{CachedResponse, ResponseCache};
use crate::error::AppError;
use crate::store::Ttl;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// 默认可缓存的最大响应体
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

pub type KeyExtractor = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// 缓存键生成规则
#[derive(Clone)]
pub enum KeyRule {
    /// 方法 + 规范化路径 + 查询串摘要
    Request,
    /// 固定的键
    Fixed(String),
    /// 自定义提取，返回 `None` 时不走缓存
    Custom(KeyExtractor),
}

/// 响应缓存中间件配置
#[derive(Clone)]
pub struct CacheGuard {
    cache: ResponseCache,
    ttl: Ttl,
    key: KeyRule,
    max_body_bytes: usize,
}

impl CacheGuard {
    pub fn new(cache: ResponseCache, ttl: Ttl) -> Self {
        Self {
            cache,
            ttl,
            key: KeyRule::Request,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_key(mut self, key: KeyRule) -> Self {
        self.key = key;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn key_for(&self, req: &Request<Body>) -> Option<String> {
        match &self.key {
            KeyRule::Request => Some(request_key(
                req.method().as_str(),
                req.uri().path(),
                req.uri().query(),
            )),
            KeyRule::Fixed(key) => Some(key.clone()),
            KeyRule::Custom(extract) => extract(req),
        }
    }
}

fn build_response(cached: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let headers = response.headers_mut();
    for (name, value) in cached.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

/// 响应缓存中间件
///
/// 只缓存 `GET` 请求的 `200 OK` 响应，不缓存 `set-cookie` 头。
/// 响应体超过上限或长度未知时直接透传。
pub async fn response_cache(
    State(guard): State<Arc<CacheGuard>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }
    let Some(key) = guard.key_for(&req) else {
        return next.run(req).await;
    };

    if let Some(cached) = guard.cache.lookup::<CachedResponse>(&key).await {
        return build_response(cached);
    }

    let response = next.run(req).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    // 长度未知或超过上限的响应原样返回，不缓存
    let within_limit = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= guard.max_body_bytes as u64);
    if !within_limit {
        tracing::debug!(key = %key, "Response body too large or unbounded, skipping cache");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, guard.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to read response body");
            return AppError::InternalServerError.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter(|(name, _)| **name != SET_COOKIE && **name != X_CACHE)
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        body: bytes.to_vec(),
    };
    guard.cache.put(&key, &cached, guard.ttl).await;

    parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}
