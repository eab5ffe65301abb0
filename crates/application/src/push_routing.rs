use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::Platform;

use crate::error::{CacheError, CacheResult};
use crate::store::KvStore;

const UID_PID_TOKEN_STATUS: &str = "UID_PID_TOKEN_STATUS:";
const FCM_TOKEN: &str = "FCM_TOKEN:";
const USER_BADGE_UNREAD_COUNT_SUM: &str = "USER_BADGE_UNREAD_COUNT_SUM:";
const GETUI_TOKEN: &str = "GETUI_TOKEN";
const GETUI_TASK_ID: &str = "GETUI_TASK_ID";

/// 某个 (用户, 平台) 下的 token → 状态标记
pub type PlatformTokens = HashMap<String, i32>;

/// 第三方推送服务下发的设备 token
///
/// 与 [`PlatformTokens`] 是两个独立实体：前者是单个带过期时间的字符串，
/// 后者是长期存在的哈希表。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderToken {
    pub account: String,
    pub platform_id: i32,
    pub token: String,
}

/// 离线推送路由信息
pub struct PushRoutingRegistry {
    store: Arc<dyn KvStore>,
}

impl PushRoutingRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn token_map_key(&self, user_id: &str, platform: &str) -> String {
        format!("{UID_PID_TOKEN_STATUS}{user_id}:{platform}")
    }

    fn provider_token_key(&self, account: &str, platform_id: i32) -> String {
        format!("{FCM_TOKEN}{account}:{platform_id}")
    }

    fn badge_key(&self, user_id: &str) -> String {
        format!("{USER_BADGE_UNREAD_COUNT_SUM}{user_id}")
    }

    async fn get_string(&self, key: String) -> CacheResult<String> {
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| CacheError::not_found(key.clone()))?;
        String::from_utf8(raw).map_err(|err| CacheError::invalid_value(key, err.to_string()))
    }

    /// 为单个 token 写入状态标记
    pub async fn add_token_flag(
        &self,
        user_id: &str,
        platform: Platform,
        token: &str,
        flag: i32,
    ) -> CacheResult<()> {
        let key = self.token_map_key(user_id, platform.name());
        self.store
            .hset(&key, &[(token.to_string(), flag.to_string())])
            .await?;
        Ok(())
    }

    pub async fn set_token_map(
        &self,
        user_id: &str,
        platform: Platform,
        tokens: &PlatformTokens,
    ) -> CacheResult<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let fields: Vec<(String, String)> = tokens
            .iter()
            .map(|(token, flag)| (token.clone(), flag.to_string()))
            .collect();
        self.store
            .hset(&self.token_map_key(user_id, platform.name()), &fields)
            .await?;
        Ok(())
    }

    /// 读取 token 表，不存在时返回空表
    pub async fn get_tokens(&self, user_id: &str, platform: Platform) -> CacheResult<PlatformTokens> {
        let key = self.token_map_key(user_id, platform.name());
        self.store
            .hgetall(&key)
            .await?
            .into_iter()
            .map(|(token, flag)| match flag.parse::<i32>() {
                Ok(flag) => Ok((token, flag)),
                Err(_) => Err(CacheError::invalid_value(key.as_str(), flag)),
            })
            .collect()
    }

    pub async fn delete_tokens(
        &self,
        user_id: &str,
        platform: Platform,
        tokens: &[String],
    ) -> CacheResult<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.store
            .hdel(&self.token_map_key(user_id, platform.name()), tokens)
            .await?;
        Ok(())
    }

    pub async fn set_provider_token(&self, token: &ProviderToken, ttl: Duration) -> CacheResult<()> {
        self.store
            .set(
                &self.provider_token_key(&token.account, token.platform_id),
                token.token.clone().into_bytes(),
                Some(ttl),
            )
            .await?;
        tracing::debug!(account = %token.account, platform_id = token.platform_id, "更新推送 token");
        Ok(())
    }

    pub async fn get_provider_token(&self, account: &str, platform_id: i32) -> CacheResult<ProviderToken> {
        let token = self
            .get_string(self.provider_token_key(account, platform_id))
            .await?;
        Ok(ProviderToken {
            account: account.to_string(),
            platform_id,
            token,
        })
    }

    pub async fn delete_provider_token(&self, account: &str, platform_id: i32) -> CacheResult<()> {
        self.store
            .del(&[self.provider_token_key(account, platform_id)])
            .await?;
        Ok(())
    }

    /// 推送服务的鉴权 token，全局唯一
    pub async fn set_getui_token(&self, token: &str, ttl: Duration) -> CacheResult<()> {
        self.store
            .set(GETUI_TOKEN, token.as_bytes().to_vec(), Some(ttl))
            .await?;
        Ok(())
    }

    pub async fn get_getui_token(&self) -> CacheResult<String> {
        self.get_string(GETUI_TOKEN.to_string()).await
    }

    pub async fn set_getui_task_id(&self, task_id: &str, ttl: Duration) -> CacheResult<()> {
        self.store
            .set(GETUI_TASK_ID, task_id.as_bytes().to_vec(), Some(ttl))
            .await?;
        Ok(())
    }

    pub async fn get_getui_task_id(&self) -> CacheResult<String> {
        self.get_string(GETUI_TASK_ID.to_string()).await
    }

    pub async fn incr_badge_unread_count(&self, user_id: &str) -> CacheResult<i64> {
        Ok(self.store.incr(&self.badge_key(user_id)).await?)
    }

    pub async fn set_badge_unread_count(&self, user_id: &str, value: i64) -> CacheResult<()> {
        self.store
            .set(&self.badge_key(user_id), value.to_string().into_bytes(), None)
            .await?;
        Ok(())
    }

    pub async fn get_badge_unread_count(&self, user_id: &str) -> CacheResult<i64> {
        let key = self.badge_key(user_id);
        let text = self.get_string(key.clone()).await?;
        text.parse::<i64>()
            .map_err(|_| CacheError::invalid_value(key, text))
    }
}
