//! Redis 存储集成测试
//!
//! 需要本地 Redis，设置 `REDIS_INTEGRATION_TEST=1` 后运行，
//! 地址可通过 `REDIS_URL` 覆盖。

use std::sync::Arc;
use std::time::Duration;

use application::{
    Batch, KvStore, MessageCache, Reply, SequenceAllocator, SignalInviteQueue,
};
use domain::{Invitation, MsgData, SignalInviteReq, SignalReq};
use infrastructure::RedisStore;
use uuid::Uuid;

async fn store() -> Option<Arc<RedisStore>> {
    if std::env::var("REDIS_INTEGRATION_TEST").is_err() {
        return None;
    }
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    Some(Arc::new(RedisStore::connect(&url).await.unwrap()))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[tokio::test]
async fn test_basic_commands() {
    let Some(store) = store().await else { return };
    let key = unique("it-basic");

    assert_eq!(store.get(&key).await.unwrap(), None);
    store
        .set(&key, b"v".to_vec(), Some(Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(b"v".to_vec()));
    assert!(!store
        .set_nx(&key, b"w".to_vec(), Duration::from_secs(30))
        .await
        .unwrap());
    assert_eq!(store.del(&[key.clone()]).await.unwrap(), 1);
    assert!(!store.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_pipeline_replies_per_command() {
    let Some(store) = store().await else { return };
    let key = unique("it-pipe");
    let missing = unique("it-missing");

    let mut batch = Batch::new();
    batch
        .set(key.as_str(), b"1".to_vec(), Some(Duration::from_secs(30)))
        .get(key.as_str())
        .get(missing.as_str())
        .del(key.as_str());
    let replies = store.execute(batch).await.unwrap();
    assert_eq!(
        replies,
        vec![
            Ok(Reply::Ok),
            Ok(Reply::Bytes(b"1".to_vec())),
            Ok(Reply::Nil),
            Ok(Reply::Int(1)),
        ]
    );
}

#[tokio::test]
async fn test_sequence_and_cache_components() {
    let Some(store) = store().await else { return };
    let user = unique("it-user");

    let allocator = SequenceAllocator::new(store.clone());
    let first = allocator.incr_user_seq(&user).await.unwrap();
    let second = allocator.incr_user_seq(&user).await.unwrap();
    assert!(second > first);

    let cache = MessageCache::new(store.clone(), Duration::from_secs(60));
    let msg = MsgData {
        send_id: "alice".into(),
        recv_id: user.clone(),
        content: b"hello".to_vec(),
        seq: second,
        ..Default::default()
    };
    assert_eq!(cache.set_messages(&user, &[msg.clone()]).await.unwrap(), 0);
    let cached = cache.get_messages_by_seq(&user, &[second, second + 1]).await;
    assert_eq!(cached.messages, vec![msg]);
    assert_eq!(cached.failed_seqs, vec![second + 1]);
    assert_eq!(cache.clean_up_user_messages(&user).await.unwrap(), 1);
}

#[tokio::test]
async fn test_signal_queue() {
    let Some(store) = store().await else { return };
    let invitee = unique("it-invitee");
    let client_msg_id = unique("it-signal");
    let queue = SignalInviteQueue::new(store, Duration::from_secs(30));

    let content = SignalReq::Invite(SignalInviteReq {
        op_user_id: "alice".into(),
        invitation: Invitation {
            inviter_user_id: "alice".into(),
            invitee_user_id_list: vec![invitee.clone()],
            ..Default::default()
        },
    })
    .to_vec()
    .unwrap();
    let msg = MsgData {
        client_msg_id,
        content,
        ..Default::default()
    };
    assert!(queue.handle_signal_invite(&msg, &invitee).await.unwrap());
    let taken = queue
        .take_available_signal_invitation(&invitee)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(taken.op_user_id, "alice");
    assert!(queue.pop_signal_invitation(&invitee).await.unwrap().is_none());
}
