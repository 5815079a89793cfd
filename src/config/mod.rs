use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::operations::RateLimitPolicy;
use crate::error::ConfigError;
use crate::store::Ttl;

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                name: "STORE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub store_backend: StoreBackend,
    pub store_timeout_ms: u64,
    pub server_host: String,
    pub server_port: u16,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub cache_ttl_secs: u64,
    pub cache_max_body_bytes: usize,
    pub session_ttl_secs: u64,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".into(),
            store_backend: StoreBackend::Redis,
            store_timeout_ms: 500,
            server_host: "::".into(),
            server_port: 3000,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            cache_ttl_secs: 30,
            cache_max_body_bytes: 1024 * 1024,
            session_ttl_secs: 3600,
            jwt_secret: String::new(),
            jwt_expiration_secs: 24 * 3600,
        }
    }
}

/// 读取环境变量，缺失时使用默认值，格式错误时报错
fn var_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

/// 解析以小时为单位的 JWT 有效期（允许 `h` 后缀），返回秒数
fn parse_jwt_expiration(raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .trim_end_matches('h')
        .parse::<u64>()
        .ok()
        .and_then(|hours| hours.checked_mul(3600))
        .ok_or_else(|| ConfigError::Invalid {
            name: "JWT_EXPIRATION",
            value: raw.to_string(),
        })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let jwt_expiration_secs = match env::var("JWT_EXPIRATION") {
            Ok(raw) => parse_jwt_expiration(&raw)?,
            Err(_) => defaults.jwt_expiration_secs,
        };

        let config = Config {
            redis_url: var_or("REDIS_URL", defaults.redis_url)?,
            store_backend: var_or("STORE_BACKEND", defaults.store_backend)?,
            store_timeout_ms: var_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
            server_host: var_or("SERVER_HOST", defaults.server_host)?,
            server_port: var_or("SERVER_PORT", defaults.server_port)?,
            rate_limit_window_secs: var_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs)?,
            rate_limit_requests: var_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests)?,
            cache_ttl_secs: var_or("CACHE_TTL", defaults.cache_ttl_secs)?,
            cache_max_body_bytes: var_or("CACHE_MAX_BODY_BYTES", defaults.cache_max_body_bytes)?,
            session_ttl_secs: var_or("SESSION_TTL", defaults.session_ttl_secs)?,
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            jwt_expiration_secs,
        };

        config.validate()?;
        Ok(config)
    }

    /// 校验所有数值配置，非正数在启动时直接拒绝
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positives: [(&'static str, u64); 7] = [
            ("STORE_TIMEOUT_MS", self.store_timeout_ms),
            ("RATE_LIMIT_WINDOW", self.rate_limit_window_secs),
            ("RATE_LIMIT_REQUESTS", u64::from(self.rate_limit_requests)),
            ("CACHE_TTL", self.cache_ttl_secs),
            ("CACHE_MAX_BODY_BYTES", self.cache_max_body_bytes as u64),
            ("SESSION_TTL", self.session_ttl_secs),
            ("JWT_EXPIRATION", self.jwt_expiration_secs),
        ];
        for (name, value) in positives {
            if value == 0 {
                return Err(ConfigError::NonPositive(name));
            }
        }
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        Ok(())
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy, ConfigError> {
        RateLimitPolicy::new(self.rate_limit_requests, self.rate_limit_window_secs)
    }

    pub fn cache_ttl(&self) -> Result<Ttl, ConfigError> {
        Ttl::from_secs(self.cache_ttl_secs).map_err(|_| ConfigError::NonPositive("CACHE_TTL"))
    }

    pub fn session_ttl(&self) -> Result<Ttl, ConfigError> {
        Ttl::from_secs(self.session_ttl_secs).map_err(|_| ConfigError::NonPositive("SESSION_TTL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            jwt_secret: "secret".into(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_with_secret_are_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn zero_window_is_rejected() {
        let config = Config {
            rate_limit_window_secs: 0,
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive("RATE_LIMIT_WINDOW"))
        ));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let config = Config {
            rate_limit_requests: 0,
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive("RATE_LIMIT_REQUESTS"))
        ));
    }

    #[test]
    fn missing_secret_is_rejected() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(" redis ".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert!("etcd".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn jwt_expiration_is_parsed_in_hours() {
        assert_eq!(parse_jwt_expiration("24").unwrap(), 24 * 3600);
        assert_eq!(parse_jwt_expiration(" 2h ").unwrap(), 7200);
        assert!(matches!(
            parse_jwt_expiration("soon"),
            Err(ConfigError::Invalid { name: "JWT_EXPIRATION", .. })
        ));
    }

    #[test]
    fn overflowing_jwt_expiration_is_rejected() {
        let raw = u64::MAX.to_string();
        assert!(matches!(
            parse_jwt_expiration(&raw),
            Err(ConfigError::Invalid { name: "JWT_EXPIRATION", value }) if value == raw
        ));
    }
}
