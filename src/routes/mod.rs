use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};

use crate::{
    AppState,
    error::ConfigError,
    middleware::{
        CacheGuard, RateLimitGuard, identify_user, log_errors, rate_limit, response_cache,
    },
};

pub mod cache;
pub mod clock;
pub mod health;
pub mod notify;
pub mod session;

/// 组装所有路由
///
/// 请求依次经过：全局 IP 限流 → 错误日志 → 身份识别 → 按用户限流 → 响应缓存 → 业务处理。
/// 健康检查不经过限流。
pub fn router(state: AppState) -> Result<Router, ConfigError> {
    let policy = state.config.rate_limit_policy()?;
    let cache_ttl = state.config.cache_ttl()?;

    let global_limit = Arc::new(RateLimitGuard::new(state.limiter.clone(), "global", policy));
    let user_limit = Arc::new(RateLimitGuard::new(state.limiter.clone(), "user", policy).by_user());
    let clock_cache = Arc::new(
        CacheGuard::new(state.cache.clone(), cache_ttl)
            .with_max_body_bytes(state.config.cache_max_body_bytes),
    );

    // 需要认证的路由
    let protected_routes = Router::new()
        .route(
            "/sessions/{id}",
            get(session::get_session)
                .put(session::update_session)
                .delete(session::delete_session),
        )
        .route("/sessions/{id}/refresh", post(session::refresh_session))
        .route("/notify/{channel}", post(notify::publish))
        .route("/cache", delete(cache::invalidate));

    let cached_routes = Router::new()
        .route("/time", get(clock::current_time))
        .layer(from_fn_with_state(clock_cache, response_cache));

    let api = Router::new()
        .route("/sessions", post(session::create_session))
        .merge(protected_routes)
        .merge(cached_routes)
        .layer(from_fn_with_state(user_limit, rate_limit))
        .layer(from_fn_with_state(state.clone(), identify_user))
        .layer(from_fn(log_errors))
        .layer(from_fn_with_state(global_limit, rate_limit));

    Ok(Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state))
}
