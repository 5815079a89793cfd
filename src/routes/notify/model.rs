use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub channel: String,
    /// 收到消息的订阅者数量，0 表示消息已被丢弃
    pub receivers: u64,
}
