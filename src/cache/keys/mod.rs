/// 缓存键模块
/// 所有组件的键都在这里生成，每个组件只使用自己的前缀

// 限流计数器键
pub mod rate_limit_keys;

// 响应缓存键
pub mod response_keys;

// 会话键
pub mod session_keys;

pub use rate_limit_keys::rate_limit_key;
pub use response_keys::{cache_key, request_key};
pub use session_keys::session_key;
