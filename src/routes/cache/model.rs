use serde::{Deserialize, Serialize};

/// `key` 与 `pattern` 必须且只能提供一个
#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub key: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub deleted: u64,
}
