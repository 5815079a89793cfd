use serde::{Serialize, de::DeserializeOwned};

use crate::cache::keys::session_key;
use crate::error::StoreError;
use crate::store::{Store, Ttl};

/// 会话存储操作
///
/// 直接读写 `session:<id>`，JSON 序列化，后写覆盖先写，没有合并和版本控制。
#[derive(Clone)]
pub struct SessionStore {
    store: Store,
}

impl SessionStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// 保存会话，覆盖旧值并重置过期时间
    pub async fn save<T: Serialize>(
        &self,
        session_id: &str,
        document: &T,
        ttl: Ttl,
    ) -> Result<(), StoreError> {
        let key = session_key(session_id);
        let json = serde_json::to_vec(document)?;
        self.store.set_ex(&key, &json, ttl).await
    }

    /// 读取会话
    ///
    /// 会话不存在、已过期、格式错误或存储不可用时都返回 `None`。
    pub async fn load<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        match self.try_load(session_id).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Session read failed, treating as absent");
                None
            }
        }
    }

    /// 读取会话，存储不可用时返回错误，便于调用方区分故障和不存在
    ///
    /// 格式错误的会话仍按不存在处理。
    pub async fn try_load<T: DeserializeOwned>(
        &self,
        session_id: &str,
    ) -> Result<Option<T>, StoreError> {
        let key = session_key(session_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(&raw) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Malformed session, treating as absent");
                Ok(None)
            }
        }
    }

    pub async fn exists(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store.exists(&session_key(session_id)).await
    }

    /// 刷新会话过期时间，会话不存在时返回 `false`
    pub async fn refresh(&self, session_id: &str, ttl: Ttl) -> Result<bool, StoreError> {
        match self.try_load::<serde_json::Value>(session_id).await? {
            Some(document) => {
                self.save(session_id, &document, ttl).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 删除会话，返回会话是否存在
    pub async fn invalidate(&self, session_id: &str) -> Result<bool, StoreError> {
        let deleted = self.store.delete(&session_key(session_id)).await?;
        Ok(deleted > 0)
    }
}
