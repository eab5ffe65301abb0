use std::sync::Arc;
use std::time::Duration;

use domain::{MsgData, MsgStatus};

use crate::error::{CacheError, CacheResult};
use crate::store::{Batch, KvStore, Reply};

const MESSAGE_CACHE: &str = "MESSAGE_CACHE:";
const SEND_MSG_FAILED_FLAG: &str = "SEND_MSG_FAILED_FLAG:";
const SEND_MSG_STATUS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 批量读取结果
///
/// `failed_seqs` 包含未命中、反序列化失败以及存储故障的序列号，
/// 调用方应当把它当作“去持久化存储拉取”的列表，而不是硬错误。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedMessages {
    pub messages: Vec<MsgData>,
    pub failed_seqs: Vec<i64>,
}

/// 近期消息缓存
///
/// 以 `(ownerID, seq)` 为键，每条消息带固定的 TTL。缓存不是消息的权威来源。
pub struct MessageCache {
    store: Arc<dyn KvStore>,
    msg_ttl: Duration,
}

impl MessageCache {
    pub fn new(store: Arc<dyn KvStore>, msg_ttl: Duration) -> Self {
        Self { store, msg_ttl }
    }

    fn message_key(&self, owner_id: &str, seq: i64) -> String {
        format!("{MESSAGE_CACHE}{owner_id}_{seq}")
    }

    /// 扫描模式会把 glob 元字符转义，扫描结果仍需经 [`Self::is_owner_message_key`] 过滤
    fn all_messages_pattern(&self, owner_id: &str) -> String {
        let mut pattern = String::with_capacity(MESSAGE_CACHE.len() + owner_id.len() + 2);
        pattern.push_str(MESSAGE_CACHE);
        for c in owner_id.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\' | '{' | '}') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push_str("_*");
        pattern
    }

    /// `bob_*` 也会匹配到 `bob_2` 的消息，只保留后缀是序列号的键
    fn is_owner_message_key(&self, owner_id: &str, key: &str) -> bool {
        key.strip_prefix(MESSAGE_CACHE)
            .and_then(|rest| rest.strip_prefix(owner_id))
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|seq| seq.parse::<i64>().is_ok())
    }

    fn send_status_key(&self, id: &str) -> String {
        format!("{SEND_MSG_FAILED_FLAG}{id}")
    }

    /// 批量读取
    pub async fn get_messages_by_seq(&self, owner_id: &str, seqs: &[i64]) -> CachedMessages {
        let mut result = CachedMessages::default();
        if seqs.is_empty() {
            return result;
        }

        let mut batch = Batch::new();
        for &seq in seqs {
            batch.get(self.message_key(owner_id, seq));
        }

        let replies = match self.store.execute(batch).await {
            Ok(replies) => replies,
            Err(err) => {
                tracing::warn!(owner_id = %owner_id, error = %err, "批量读取消息缓存失败");
                result.failed_seqs = seqs.to_vec();
                return result;
            }
        };

        let mut replies = replies.into_iter();
        for &seq in seqs {
            match replies.next() {
                Some(Ok(Reply::Bytes(raw))) => match serde_json::from_slice::<MsgData>(&raw) {
                    Ok(msg) => result.messages.push(msg),
                    Err(err) => {
                        tracing::warn!(owner_id = %owner_id, seq, error = %err, "缓存消息反序列化失败");
                        result.failed_seqs.push(seq);
                    }
                },
                Some(Err(err)) => {
                    tracing::warn!(owner_id = %owner_id, seq, error = %err, "读取缓存消息失败");
                    result.failed_seqs.push(seq);
                }
                _ => result.failed_seqs.push(seq),
            }
        }
        result
    }

    /// 批量写入，返回失败的条数
    ///
    /// 批次本身提交失败时返回错误；单条失败只计数，已写入的条目不会回滚。
    pub async fn set_messages(&self, owner_id: &str, msgs: &[MsgData]) -> CacheResult<usize> {
        let mut failed = 0;
        let mut batch = Batch::new();
        for msg in msgs {
            match serde_json::to_vec(msg) {
                Ok(raw) => {
                    batch.set(self.message_key(owner_id, msg.seq), raw, Some(self.msg_ttl));
                }
                Err(err) => {
                    tracing::warn!(owner_id = %owner_id, seq = msg.seq, error = %err, "消息序列化失败");
                    failed += 1;
                }
            }
        }
        if batch.is_empty() {
            return Ok(failed);
        }

        let replies = self.store.execute(batch).await?;
        failed += replies.iter().filter(|reply| reply.is_err()).count();
        if failed > 0 {
            tracing::warn!(owner_id = %owner_id, failed, total = msgs.len(), "部分消息写入缓存失败");
        }
        Ok(failed)
    }

    /// 按序列号硬删除
    pub async fn delete_messages(&self, owner_id: &str, seqs: &[i64]) -> CacheResult<()> {
        if seqs.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::new();
        for &seq in seqs {
            batch.del(self.message_key(owner_id, seq));
        }
        for reply in self.store.execute(batch).await? {
            reply?;
        }
        Ok(())
    }

    /// 清空用户的全部缓存消息，返回删除的键数量
    ///
    /// 扫描与删除之间不是原子的，并发写入的新消息可能残留。
    pub async fn clean_up_user_messages(&self, owner_id: &str) -> CacheResult<usize> {
        let keys: Vec<String> = self
            .store
            .scan_match(&self.all_messages_pattern(owner_id))
            .await?
            .into_iter()
            .filter(|key| self.is_owner_message_key(owner_id, key))
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let mut batch = Batch::new();
        for key in &keys {
            batch.del(key.as_str());
        }
        let mut removed = 0;
        for reply in self.store.execute(batch).await? {
            if let Reply::Int(n) = reply? {
                removed += n as usize;
            }
        }
        tracing::info!(owner_id = %owner_id, removed, "清空用户消息缓存");
        Ok(removed)
    }

    /// 软删除：将状态置为已删除并按配置的 TTL 写回，不存在的条目直接跳过
    pub async fn soft_delete_messages(&self, owner_id: &str, seqs: &[i64]) -> CacheResult<()> {
        for &seq in seqs {
            let key = self.message_key(owner_id, seq);
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let mut msg: MsgData = serde_json::from_slice(&raw)?;
            msg.status = MsgStatus::Deleted;
            self.store
                .set(&key, serde_json::to_vec(&msg)?, Some(self.msg_ttl))
                .await?;
        }
        Ok(())
    }

    /// 记录消息发送状态，保留 24 小时
    pub async fn set_send_msg_status(&self, id: &str, status: i32) -> CacheResult<()> {
        self.store
            .set(
                &self.send_status_key(id),
                status.to_string().into_bytes(),
                Some(SEND_MSG_STATUS_TTL),
            )
            .await?;
        Ok(())
    }

    pub async fn get_send_msg_status(&self, id: &str) -> CacheResult<i32> {
        let key = self.send_status_key(id);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| CacheError::not_found(key.clone()))?;
        let text = String::from_utf8_lossy(&raw);
        text.parse::<i32>()
            .map_err(|_| CacheError::invalid_value(key, text.into_owned()))
    }
}
