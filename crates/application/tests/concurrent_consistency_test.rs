//! 并发一致性测试
//!
//! 验证多个任务同时操作同一个存储时，序列号与锁的语义仍然成立

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use application::store::memory::MemoryStore;
use application::{CacheError, MessageCache, ReactionStore, SequenceAllocator};
use domain::{MsgData, SessionType};
use futures::future::join_all;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_seq_allocation_is_unique() {
    let store = Arc::new(MemoryStore::new());
    let allocator = Arc::new(SequenceAllocator::new(store));

    let tasks = (0..50).map(|_| {
        let allocator = allocator.clone();
        tokio::spawn(async move { allocator.incr_user_seq("alice").await.unwrap() })
    });
    let seqs: Vec<i64> = join_all(tasks)
        .await
        .into_iter()
        .map(|res| res.unwrap())
        .collect();

    let unique: HashSet<_> = seqs.iter().copied().collect();
    assert_eq!(unique.len(), 50);
    assert_eq!(unique.iter().max(), Some(&50));
    assert_eq!(allocator.get_user_max_seq("alice").await.unwrap(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_one_lock_holder() {
    let store = Arc::new(MemoryStore::new());
    let reactions = Arc::new(ReactionStore::new(store));

    let tasks = (0..20).map(|_| {
        let reactions = reactions.clone();
        tokio::spawn(async move { reactions.lock_type_key("c1", "like").await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|res| res.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|res| res.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|res| res.as_ref().err())
        .all(|err| matches!(err, CacheError::LockHeld { .. })));

    reactions.unlock_type_key("c1", "like").await.unwrap();
    reactions.lock_type_key("c1", "like").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_allocate_then_cache_under_contention() {
    let store = Arc::new(MemoryStore::new());
    let allocator = Arc::new(SequenceAllocator::new(store.clone()));
    let cache = Arc::new(MessageCache::new(store, Duration::from_secs(60)));

    let tasks = (0..30).map(|i| {
        let allocator = allocator.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            let seq = allocator.incr_user_seq("bob").await.unwrap();
            let msg = MsgData {
                send_id: "alice".into(),
                recv_id: "bob".into(),
                client_msg_id: format!("c{i}"),
                session_type: SessionType::Single.code(),
                seq,
                ..Default::default()
            };
            assert_eq!(cache.set_messages("bob", &[msg]).await.unwrap(), 0);
        })
    });
    for res in join_all(tasks).await {
        res.unwrap();
    }

    let seqs: Vec<i64> = (1..=30).collect();
    let cached = cache.get_messages_by_seq("bob", &seqs).await;
    assert_eq!(cached.messages.len(), 30);
    assert!(cached.failed_seqs.is_empty());
    let ids: HashSet<_> = cached.messages.iter().map(|m| m.client_msg_id.clone()).collect();
    assert_eq!(ids.len(), 30);
}
