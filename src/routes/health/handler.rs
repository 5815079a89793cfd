use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    store::Health,
    utils::{error_codes, success_to_api_response},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub store: String,
}

/// 存储不可用时返回 503，其他接口仍然降级可用
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health().await {
        Health::Connected => (
            StatusCode::OK,
            success_to_api_response(HealthResponse {
                store: "connected".into(),
            }),
        ),
        Health::Disconnected => {
            let mut body = success_to_api_response(HealthResponse {
                store: "disconnected".into(),
            });
            body.code = error_codes::STORE_UNAVAILABLE;
            body.msg = "存储服务不可用".into();
            (StatusCode::SERVICE_UNAVAILABLE, body)
        }
    }
}
