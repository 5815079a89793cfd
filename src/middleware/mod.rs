mod auth;
mod cache;
mod error_handler;
mod rate_limit;

pub use auth::{AuthenticatedUser, identify_user};
pub use cache::{CacheGuard, KeyExtractor, KeyRule, response_cache};
pub use error_handler::log_errors;
pub use rate_limit::{IdentityExtractor, IdentityRule, RateLimitGuard, client_ip, rate_limit};
