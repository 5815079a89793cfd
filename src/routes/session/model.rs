use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 保存在 `session:<id>` 下的会话文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub user_id: String,
    #[serde(default)]
    pub data: Value,
    pub created_at: i64, // Unix timestamp
    pub updated_at: i64, // Unix timestamp
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub token: String,
    pub token_expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshSessionResponse {
    pub session_id: String,
    pub ttl_secs: u64,
}
