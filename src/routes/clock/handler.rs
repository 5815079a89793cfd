use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::utils::success_to_api_response;

#[derive(Debug, Serialize, Deserialize)]
pub struct ClockResponse {
    pub now: String,
    pub unix_millis: i64,
}

/// 返回服务器时间，挂在响应缓存之后用于观察缓存命中
pub async fn current_time() -> impl IntoResponse {
    let now = chrono::Utc::now();
    success_to_api_response(ClockResponse {
        now: now.to_rfc3339(),
        unix_millis: now.timestamp_millis(),
    })
}
