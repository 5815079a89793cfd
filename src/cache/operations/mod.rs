/// 缓存操作
/// 基于存储客户端实现限流、响应缓存、会话和通知

// 限流
pub mod rate_limit;

// 响应缓存
pub mod response;

// 会话
pub mod session;

// 发布/订阅通知
pub mod notify;

// 重新导出常用操作
pub use notify::{Handler, Notification, NotificationChannel, SubscriptionId};
pub use rate_limit::{Admission, RateLimitPolicy, RateLimiter};
pub use response::ResponseCache;
pub use session::SessionStore;
