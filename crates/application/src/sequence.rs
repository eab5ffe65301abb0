use std::sync::Arc;

use crate::error::{CacheError, CacheResult};
use crate::store::KvStore;

const USER_INCR_SEQ: &str = "REDIS_USER_INCR_SEQ:";
const USER_MIN_SEQ: &str = "REDIS_USER_MIN_SEQ:";
const GROUP_MAX_SEQ: &str = "GROUP_MAX_SEQ:";
const GROUP_MIN_SEQ: &str = "GROUP_MIN_SEQ:";
const GROUP_USER_MIN_SEQ: &str = "GROUP_USER_MIN_SEQ:";

/// 序列号分配器
///
/// 按用户、群、以及 (群, 用户) 维护单调递增的序列号和最小/最大水位。
/// 自增依赖存储的原子 INCR，多个网关实例并发调用也不会拿到重复的值。
/// 水位必须显式初始化，读取未初始化的水位返回 [`CacheError::NotFound`]。
pub struct SequenceAllocator {
    store: Arc<dyn KvStore>,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn user_max_seq_key(&self, user_id: &str) -> String {
        format!("{USER_INCR_SEQ}{user_id}")
    }

    fn user_min_seq_key(&self, user_id: &str) -> String {
        format!("{USER_MIN_SEQ}{user_id}")
    }

    fn group_max_seq_key(&self, group_id: &str) -> String {
        format!("{GROUP_MAX_SEQ}{group_id}")
    }

    fn group_min_seq_key(&self, group_id: &str) -> String {
        format!("{GROUP_MIN_SEQ}{group_id}")
    }

    fn group_user_min_seq_key(&self, group_id: &str, user_id: &str) -> String {
        format!("{GROUP_USER_MIN_SEQ}g:{group_id}u:{user_id}")
    }

    async fn get_watermark(&self, key: String) -> CacheResult<i64> {
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| CacheError::not_found(key.clone()))?;
        let text = String::from_utf8_lossy(&raw);
        text.parse::<i64>()
            .map_err(|_| CacheError::invalid_value(key, text.into_owned()))
    }

    async fn set_watermark(&self, key: String, seq: i64) -> CacheResult<()> {
        self.store
            .set(&key, seq.to_string().into_bytes(), None)
            .await?;
        Ok(())
    }

    /// 为用户分配下一个序列号
    pub async fn incr_user_seq(&self, user_id: &str) -> CacheResult<i64> {
        let seq = self.store.incr(&self.user_max_seq_key(user_id)).await?;
        tracing::debug!(user_id = %user_id, seq, "分配用户序列号");
        Ok(seq)
    }

    pub async fn get_user_max_seq(&self, user_id: &str) -> CacheResult<i64> {
        self.get_watermark(self.user_max_seq_key(user_id)).await
    }

    pub async fn set_user_max_seq(&self, user_id: &str, max_seq: i64) -> CacheResult<()> {
        self.set_watermark(self.user_max_seq_key(user_id), max_seq)
            .await
    }

    pub async fn get_user_min_seq(&self, user_id: &str) -> CacheResult<i64> {
        self.get_watermark(self.user_min_seq_key(user_id)).await
    }

    pub async fn set_user_min_seq(&self, user_id: &str, min_seq: i64) -> CacheResult<()> {
        self.set_watermark(self.user_min_seq_key(user_id), min_seq)
            .await
    }

    /// 为群分配下一个序列号
    pub async fn incr_group_max_seq(&self, group_id: &str) -> CacheResult<i64> {
        let seq = self.store.incr(&self.group_max_seq_key(group_id)).await?;
        tracing::debug!(group_id = %group_id, seq, "分配群序列号");
        Ok(seq)
    }

    pub async fn get_group_max_seq(&self, group_id: &str) -> CacheResult<i64> {
        self.get_watermark(self.group_max_seq_key(group_id)).await
    }

    pub async fn set_group_max_seq(&self, group_id: &str, max_seq: i64) -> CacheResult<()> {
        self.set_watermark(self.group_max_seq_key(group_id), max_seq)
            .await
    }

    pub async fn get_group_min_seq(&self, group_id: &str) -> CacheResult<i64> {
        self.get_watermark(self.group_min_seq_key(group_id)).await
    }

    pub async fn set_group_min_seq(&self, group_id: &str, min_seq: i64) -> CacheResult<()> {
        self.set_watermark(self.group_min_seq_key(group_id), min_seq)
            .await
    }

    pub async fn get_group_user_min_seq(&self, group_id: &str, user_id: &str) -> CacheResult<i64> {
        self.get_watermark(self.group_user_min_seq_key(group_id, user_id))
            .await
    }

    pub async fn set_group_user_min_seq(
        &self,
        group_id: &str,
        user_id: &str,
        min_seq: i64,
    ) -> CacheResult<()> {
        self.set_watermark(self.group_user_min_seq_key(group_id, user_id), min_seq)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::collections::HashSet;

    fn allocator() -> SequenceAllocator {
        SequenceAllocator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_consecutive_increments_strictly_increase() {
        let allocator = allocator();
        let first = allocator.incr_user_seq("u1").await.unwrap();
        let second = allocator.incr_user_seq("u1").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_max_seq_before_increment_is_not_found() {
        let allocator = allocator();
        let err = allocator.get_user_max_seq("u1").await.unwrap_err();
        assert!(err.is_not_found());

        let mut last = 0;
        for _ in 0..5 {
            last = allocator.incr_user_seq("u1").await.unwrap();
        }
        assert_eq!(allocator.get_user_max_seq("u1").await.unwrap(), last);
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_concurrent_increments_never_repeat() {
        let allocator = Arc::new(allocator());
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.incr_user_seq("u1").await })
            })
            .collect();

        let seqs: Vec<i64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();
        let unique: HashSet<_> = seqs.iter().copied().collect();
        assert_eq!(unique.len(), seqs.len());
        assert_eq!(allocator.get_user_max_seq("u1").await.unwrap(), 32);
    }

    #[tokio::test]
    async fn test_min_seq_watermarks() {
        let allocator = allocator();
        assert!(allocator.get_user_min_seq("u1").await.unwrap_err().is_not_found());
        allocator.set_user_min_seq("u1", 10).await.unwrap();
        assert_eq!(allocator.get_user_min_seq("u1").await.unwrap(), 10);

        allocator.set_group_user_min_seq("g1", "u1", 3).await.unwrap();
        assert_eq!(allocator.get_group_user_min_seq("g1", "u1").await.unwrap(), 3);
        assert!(allocator
            .get_group_user_min_seq("g1", "u2")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_group_scope_is_independent_of_user_scope() {
        let allocator = allocator();
        allocator.set_group_max_seq("g1", 100).await.unwrap();
        assert_eq!(allocator.incr_group_max_seq("g1").await.unwrap(), 101);
        assert_eq!(allocator.incr_user_seq("g1").await.unwrap(), 1);

        allocator.set_group_min_seq("g1", 50).await.unwrap();
        assert_eq!(allocator.get_group_min_seq("g1").await.unwrap(), 50);
        assert_eq!(allocator.get_group_max_seq("g1").await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_corrupt_watermark_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("REDIS_USER_MIN_SEQ:u1", b"abc".to_vec(), None)
            .await
            .unwrap();
        let allocator = SequenceAllocator::new(store);
        assert!(matches!(
            allocator.get_user_min_seq("u1").await,
            Err(CacheError::InvalidValue { .. })
        ));
    }
}
