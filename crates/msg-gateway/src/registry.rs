//! 在线会话注册表
//!
//! 按连接 ID 与 (用户, 平台) 两个维度索引在线会话。同一用户在同一平台上
//! 只保留最新的连接，被替换的旧会话由调用方踢下线。

use std::collections::HashMap;
use std::sync::Arc;

use domain::MsgData;
use tokio::sync::RwLock;

use crate::session::{ConnectionSession, UnregisterReceiver};

#[derive(Default)]
struct Inner {
    by_conn: HashMap<String, Arc<ConnectionSession>>,
    by_user: HashMap<String, HashMap<i32, String>>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册会话，返回被同一 (用户, 平台) 替换下来的旧会话
    pub async fn register(&self, session: Arc<ConnectionSession>) -> Option<Arc<ConnectionSession>> {
        let mut inner = self.inner.write().await;
        let previous_conn = inner
            .by_user
            .entry(session.user_id().to_string())
            .or_default()
            .insert(session.platform_id(), session.conn_id().to_string());
        let previous = previous_conn.and_then(|conn_id| inner.by_conn.remove(&conn_id));
        inner
            .by_conn
            .insert(session.conn_id().to_string(), session.clone());

        tracing::info!(
            conn_id = %session.conn_id(),
            user_id = %session.user_id(),
            platform_id = session.platform_id(),
            online = inner.by_conn.len(),
            replaced = previous.is_some(),
            "会话已注册"
        );
        previous
    }

    /// 注销会话；已经被新连接替换的槽位保持不变
    pub async fn unregister(&self, session: &ConnectionSession) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.by_conn.remove(session.conn_id()).is_some();

        if let Some(platforms) = inner.by_user.get_mut(session.user_id()) {
            if platforms.get(&session.platform_id()).map(String::as_str) == Some(session.conn_id()) {
                platforms.remove(&session.platform_id());
            }
            if platforms.is_empty() {
                inner.by_user.remove(session.user_id());
            }
        }

        if removed {
            tracing::info!(
                conn_id = %session.conn_id(),
                user_id = %session.user_id(),
                online = inner.by_conn.len(),
                "会话已注销"
            );
        }
        removed
    }

    /// 消费会话关闭时交出的注销请求，直到所有发送端都被丢弃
    pub async fn run(self: Arc<Self>, mut unregister_rx: UnregisterReceiver) {
        while let Some(session) = unregister_rx.recv().await {
            self.unregister(&session).await;
        }
        tracing::debug!("注销通道已关闭，注册表循环退出");
    }

    pub async fn get_session(&self, user_id: &str, platform_id: i32) -> Option<Arc<ConnectionSession>> {
        let inner = self.inner.read().await;
        let conn_id = inner.by_user.get(user_id)?.get(&platform_id)?;
        inner.by_conn.get(conn_id).cloned()
    }

    pub async fn get_user_sessions(&self, user_id: &str) -> Vec<Arc<ConnectionSession>> {
        let inner = self.inner.read().await;
        let Some(platforms) = inner.by_user.get(user_id) else {
            return Vec::new();
        };
        let mut sessions: Vec<_> = platforms
            .values()
            .filter_map(|conn_id| inner.by_conn.get(conn_id).cloned())
            .collect();
        sessions.sort_by_key(|session| session.platform_id());
        sessions
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.by_conn.len()
    }

    pub async fn online_user_count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    /// 推送给用户在所有平台上的连接，返回成功写出的连接数
    pub async fn push_to_user(&self, user_id: &str, operation_id: &str, msg: &MsgData) -> usize {
        let mut delivered = 0;
        for session in self.get_user_sessions(user_id).await {
            match session.push_message(operation_id, msg).await {
                Ok(()) if session.is_open() => delivered += 1,
                Ok(()) => {}
                Err(err) => tracing::warn!(
                    conn_id = %session.conn_id(),
                    user_id = %user_id,
                    error = %err,
                    "推送消息失败"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockMessageHandler;
    use crate::session::{GatewayContext, SessionState, UnregisterSender};
    use crate::transport::channel::{self, Peer};
    use domain::{Frame, Resp, ReqIdentifier};
    use tokio::sync::mpsc;

    fn context() -> (Arc<GatewayContext>, UnregisterReceiver) {
        let (tx, rx): (UnregisterSender, _) = mpsc::unbounded_channel();
        (
            Arc::new(GatewayContext::new(Arc::new(MockMessageHandler::new()), tx)),
            rx,
        )
    }

    fn session(ctx: &Arc<GatewayContext>, user_id: &str, platform_id: i32) -> (Arc<ConnectionSession>, Peer) {
        let (_source, sink, peer) = channel::pair();
        let session = ConnectionSession::new(user_id, platform_id, false, Box::new(sink), ctx.clone());
        (session, peer)
    }

    #[tokio::test]
    async fn test_register_indexes_by_user_and_platform() {
        let (ctx, _rx) = context();
        let registry = SessionRegistry::new();
        let (ios, _p1) = session(&ctx, "alice", 1);
        let (web, _p2) = session(&ctx, "alice", 5);
        let (bob, _p3) = session(&ctx, "bob", 1);

        assert!(registry.register(ios.clone()).await.is_none());
        assert!(registry.register(web.clone()).await.is_none());
        assert!(registry.register(bob).await.is_none());

        assert_eq!(registry.online_count().await, 3);
        assert_eq!(registry.online_user_count().await, 2);
        let sessions = registry.get_user_sessions("alice").await;
        assert_eq!(sessions.len(), 2);
        assert!(Arc::ptr_eq(&sessions[0], &ios));
        assert!(Arc::ptr_eq(&sessions[1], &web));
        assert!(registry.get_user_sessions("carol").await.is_empty());
    }

    #[tokio::test]
    async fn test_same_platform_replaces_and_stale_unregister_is_ignored() {
        let (ctx, _rx) = context();
        let registry = SessionRegistry::new();
        let (old, _p1) = session(&ctx, "alice", 1);
        let (new, _p2) = session(&ctx, "alice", 1);

        registry.register(old.clone()).await;
        let replaced = registry.register(new.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&replaced, &old));
        assert_eq!(registry.online_count().await, 1);

        // 旧会话关闭后的注销不能影响新会话
        assert!(!registry.unregister(&old).await);
        let current = registry.get_session("alice", 1).await.unwrap();
        assert!(Arc::ptr_eq(&current, &new));

        assert!(registry.unregister(&new).await);
        assert!(registry.get_session("alice", 1).await.is_none());
        assert_eq!(registry.online_user_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_sessions_are_unregistered_by_run_loop() {
        let (ctx, rx) = context();
        let registry = Arc::new(SessionRegistry::new());
        let looped = tokio::spawn(registry.clone().run(rx));

        let (first, _p1) = session(&ctx, "alice", 1);
        let (second, _p2) = session(&ctx, "alice", 2);
        registry.register(first.clone()).await;
        registry.register(second.clone()).await;

        first.close().await;
        second.close().await;
        assert_eq!(first.state(), SessionState::Closed);

        drop(first);
        drop(second);
        drop(ctx);
        looped.await.unwrap();
        assert_eq!(registry.online_count().await, 0);
    }

    #[tokio::test]
    async fn test_push_to_user_reaches_every_platform() {
        let (ctx, _rx) = context();
        let registry = SessionRegistry::new();
        let (ios, mut ios_peer) = session(&ctx, "alice", 1);
        let (web, mut web_peer) = session(&ctx, "alice", 5);
        registry.register(ios).await;
        registry.register(web.clone()).await;

        web.close().await;
        let msg = MsgData {
            send_id: "bob".into(),
            recv_id: "alice".into(),
            client_msg_id: "c1".into(),
            ..Default::default()
        };
        assert_eq!(registry.push_to_user("alice", "op", &msg).await, 1);

        let Some(Frame::Binary(bytes)) = ios_peer.outbound.recv().await else {
            panic!("expected pushed frame");
        };
        let resp: Resp = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(resp.req_identifier, ReqIdentifier::PushMsg.code());
        assert!(web_peer.outbound.try_recv().is_err());
    }
}
