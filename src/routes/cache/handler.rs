use axum::{
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    AppState, error::AppError, middleware::AuthenticatedUser, utils::success_to_api_response,
};

use super::model::{InvalidateQuery, InvalidateResponse};

/// 缓存失效后发布通知的频道
pub const INVALIDATION_CHANNEL: &str = "cache.invalidated";

pub async fn invalidate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<InvalidateQuery>,
) -> Result<impl IntoResponse, AppError> {
    let result = match (&query.key, &query.pattern) {
        (Some(key), None) => state.cache.invalidate(key).await,
        (None, Some(pattern)) => state.cache.invalidate_pattern(pattern).await,
        _ => {
            return Err(AppError::BadRequest(
                "必须且只能提供 key 或 pattern 其中之一".to_string(),
            ));
        }
    };

    let deleted = result.map_err(|e| {
        tracing::warn!(error = %e, "Cache invalidation failed");
        AppError::StoreUnavailable
    })?;

    let response = InvalidateResponse {
        key: query.key,
        pattern: query.pattern,
        deleted,
    };
    match serde_json::to_vec(&response) {
        Ok(payload) => {
            state.notifier.publish(INVALIDATION_CHANNEL, payload).await;
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode invalidation notice"),
    }

    tracing::info!(user_id = %user.0, deleted, "Cache invalidated");
    Ok(success_to_api_response(response))
}
