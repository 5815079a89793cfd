use sha2::{Digest, Sha256};

/// 响应缓存键前缀
const CACHE_PREFIX: &str = "cache:";

/// 查询串摘要保留的十六进制字符数
const QUERY_DIGEST_LEN: usize = 16;

/// 生成响应缓存键，也可用于生成失效模式
pub fn cache_key(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
}

/// 根据请求生成确定的缓存键：`METHOD:path[?digest]`
///
/// 路径中连续的 `/` 会被合并，末尾的 `/` 会被去掉；
/// 查询参数排序后取 SHA-256 摘要，参数顺序不影响结果。
pub fn request_key(method: &str, path: &str, query: Option<&str>) -> String {
    let path = normalize_path(path);
    match query.and_then(query_digest) {
        Some(digest) => format!("{}:{}?{}", method.to_ascii_uppercase(), path, digest),
        None => format!("{}:{}", method.to_ascii_uppercase(), path),
    }
}

fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn query_digest(query: &str) -> Option<String> {
    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_unstable();

    let digest = Sha256::digest(pairs.join("&").as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(QUERY_DIGEST_LEN);
    Some(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_normalized() {
        assert_eq!(request_key("get", "//users///42/", None), "GET:/users/42");
        assert_eq!(request_key("GET", "/", None), "GET:/");
        assert_eq!(request_key("GET", "", None), "GET:/");
    }

    #[test]
    fn query_order_does_not_matter() {
        let a = request_key("GET", "/items", Some("b=2&a=1"));
        let b = request_key("GET", "/items", Some("a=1&b=2&"));
        assert_eq!(a, b);
        assert!(a.starts_with("GET:/items?"));
        assert_eq!(a.len(), "GET:/items?".len() + QUERY_DIGEST_LEN);
    }

    #[test]
    fn different_queries_give_different_keys() {
        assert_ne!(
            request_key("GET", "/items", Some("page=1")),
            request_key("GET", "/items", Some("page=2"))
        );
    }

    #[test]
    fn empty_query_is_ignored() {
        assert_eq!(request_key("GET", "/items", Some("")), "GET:/items");
        assert_eq!(request_key("GET", "/items", Some("&&")), "GET:/items");
    }

    #[test]
    fn method_is_part_of_key() {
        assert_ne!(
            request_key("GET", "/items", None),
            request_key("HEAD", "/items", None)
        );
    }
}
