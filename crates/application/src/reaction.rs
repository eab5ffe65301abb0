use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::SessionType;

use crate::error::{CacheError, CacheResult};
use crate::store::KvStore;

const EX_LOCK: &str = "EX_LOCK:";
const LOCK_TTL: Duration = Duration::from_secs(60);

/// 消息扩展（表情回应）存储
///
/// 每条消息一个哈希表，键前缀由会话类型决定；`session_type` 以协议中的整数给出，
/// 无法识别时返回 [`CacheError::InvalidSessionType`]。
pub struct ReactionStore {
    store: Arc<dyn KvStore>,
}

impl ReactionStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn reaction_key(&self, client_msg_id: &str, session_type: i32) -> CacheResult<String> {
        let prefix = match SessionType::try_from(session_type)? {
            SessionType::Single => "EX_SINGLE_",
            SessionType::Group => "EX_GROUP_",
            SessionType::SuperGroup => "EX_SUPER_GROUP_",
            SessionType::Notification => "EX_NOTIFICATION_",
        };
        Ok(format!("{prefix}{client_msg_id}"))
    }

    fn lock_key(&self, client_msg_id: &str, type_key: &str) -> String {
        format!("{EX_LOCK}{client_msg_id}_{type_key}")
    }

    pub async fn reaction_exists(&self, client_msg_id: &str, session_type: i32) -> CacheResult<bool> {
        let key = self.reaction_key(client_msg_id, session_type)?;
        Ok(self.store.exists(&key).await?)
    }

    pub async fn set_reaction_value(
        &self,
        client_msg_id: &str,
        session_type: i32,
        type_key: &str,
        value: &str,
    ) -> CacheResult<()> {
        let key = self.reaction_key(client_msg_id, session_type)?;
        self.store
            .hset(&key, &[(type_key.to_string(), value.to_string())])
            .await?;
        Ok(())
    }

    pub async fn get_reaction_value(
        &self,
        client_msg_id: &str,
        session_type: i32,
        type_key: &str,
    ) -> CacheResult<Option<String>> {
        let key = self.reaction_key(client_msg_id, session_type)?;
        Ok(self.store.hget(&key, type_key).await?)
    }

    pub async fn get_all_reactions(
        &self,
        client_msg_id: &str,
        session_type: i32,
    ) -> CacheResult<HashMap<String, String>> {
        let key = self.reaction_key(client_msg_id, session_type)?;
        Ok(self.store.hgetall(&key).await?)
    }

    pub async fn delete_reaction_key(
        &self,
        client_msg_id: &str,
        session_type: i32,
        type_key: &str,
    ) -> CacheResult<()> {
        let key = self.reaction_key(client_msg_id, session_type)?;
        self.store.hdel(&key, &[type_key.to_string()]).await?;
        Ok(())
    }

    /// 返回键是否存在并设置了过期时间
    pub async fn set_reaction_expire(
        &self,
        client_msg_id: &str,
        session_type: i32,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let key = self.reaction_key(client_msg_id, session_type)?;
        Ok(self.store.expire(&key, ttl).await?)
    }

    /// 对 (消息, 扩展键) 加咨询锁，60 秒后自动释放
    ///
    /// 锁已被持有时返回 [`CacheError::LockHeld`]。
    pub async fn lock_type_key(&self, client_msg_id: &str, type_key: &str) -> CacheResult<()> {
        let key = self.lock_key(client_msg_id, type_key);
        if self.store.set_nx(&key, b"1".to_vec(), LOCK_TTL).await? {
            Ok(())
        } else {
            tracing::debug!(client_msg_id = %client_msg_id, type_key = %type_key, "扩展键已被锁定");
            Err(CacheError::LockHeld { key })
        }
    }

    pub async fn unlock_type_key(&self, client_msg_id: &str, type_key: &str) -> CacheResult<()> {
        self.store
            .del(&[self.lock_key(client_msg_id, type_key)])
            .await?;
        Ok(())
    }
}
