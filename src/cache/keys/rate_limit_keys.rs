/// 限流计数器键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 生成限流计数器键，`scope` 区分限流器实例，`identity` 区分调用方
pub fn rate_limit_key(scope: &str, identity: &str) -> String {
    format!("{}{}:{}", RATE_LIMIT_PREFIX, scope, identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_contains_scope_and_identity() {
        assert_eq!(rate_limit_key("global", "10.0.0.1"), "rate_limit:global:10.0.0.1");
    }
}
