use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{AppState, error::AppError, utils::verify_token};

/// 已认证用户，由 `identify_user` 写入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// 作为提取器使用时要求请求已认证
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 解析 Bearer token
///
/// 没有 `Authorization` 头的请求按匿名处理；token 无效时返回 401。
pub async fn identify_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !req.headers().contains_key(AUTHORIZATION) {
        return Ok(next.run(req).await);
    }

    let Some(auth) = req.headers().typed_get::<Authorization<Bearer>>() else {
        return Err(AppError::Unauthorized);
    };

    match verify_token(auth.token(), &state.config) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthenticatedUser(claims.sub));
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            Err(AppError::Unauthorized)
        }
    }
}
