//! 通过真实 WebSocket 连接驱动网关的端到端测试

use std::sync::Arc;
use std::time::Duration;

use application::store::memory::MemoryStore;
use application::{MessageCache, SequenceAllocator, SignalInviteQueue};
use domain::{MsgData, Req, ReqIdentifier, Resp, SessionType};
use futures::{SinkExt, StreamExt};
use msg_gateway::payload::{GetNewestSeqResp, PullMsgBySeqListReq, PullMsgBySeqListResp, SendMsgResp};
use msg_gateway::{router, Compressor, GatewayState, GzipCompressor, StoreBackedHandler};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_gateway() -> (String, GatewayState) {
    let store = Arc::new(MemoryStore::new());
    let handler = StoreBackedHandler::new(
        Arc::new(SequenceAllocator::new(store.clone())),
        Arc::new(MessageCache::new(store.clone(), Duration::from_secs(86400))),
        Arc::new(SignalInviteQueue::new(store, Duration::from_secs(35))),
    );
    let state = GatewayState::start(Arc::new(handler), Duration::from_secs(5));
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("ws://{addr}/ws"), state)
}

async fn connect(base: &str, user_id: &str, platform_id: i32, gzip: bool) -> Client {
    let mut url = format!("{base}?sendID={user_id}&platformID={platform_id}");
    if gzip {
        url.push_str("&compression=gzip");
    }
    let (client, _) = connect_async(url.as_str()).await.unwrap();
    client
}

fn request<T: Serialize>(identifier: ReqIdentifier, user_id: &str, msg_incr: &str, data: &T) -> Req {
    Req {
        req_identifier: identifier.code(),
        send_id: user_id.into(),
        operation_id: format!("op-{msg_incr}"),
        msg_incr: msg_incr.into(),
        data: serde_json::to_vec(data).unwrap(),
        ..Default::default()
    }
}

async fn send(client: &mut Client, req: &Req, gzip: bool) {
    let mut bytes = serde_json::to_vec(req).unwrap();
    if gzip {
        bytes = GzipCompressor.compress(&bytes).unwrap();
    }
    client.send(Message::Binary(bytes.into())).await.unwrap();
}

async fn recv(client: &mut Client, gzip: bool) -> Resp {
    loop {
        let message = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        if let Message::Binary(data) = message {
            let mut bytes = data.to_vec();
            if gzip {
                bytes = GzipCompressor.decompress(&bytes).unwrap();
            }
            return serde_json::from_slice(&bytes).unwrap();
        }
    }
}

async fn wait_for_online(state: &GatewayState, expected: usize) {
    timeout(WAIT, async {
        while state.registry.online_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_send_and_pull_over_websocket() {
    let (base, state) = spawn_gateway().await;
    let mut alice = connect(&base, "alice", 1, true).await;
    let mut bob = connect(&base, "bob", 5, false).await;
    wait_for_online(&state, 2).await;

    let msg = MsgData {
        send_id: "alice".into(),
        recv_id: "bob".into(),
        client_msg_id: "c1".into(),
        session_type: SessionType::Single.code(),
        content: b"hello bob".to_vec(),
        ..Default::default()
    };
    send(&mut alice, &request(ReqIdentifier::SendMsg, "alice", "1", &msg), true).await;
    let resp = recv(&mut alice, true).await;
    assert!(resp.is_success(), "{resp:?}");
    assert_eq!(resp.msg_incr, "1");
    let sent: SendMsgResp = serde_json::from_slice(&resp.data).unwrap();
    assert_eq!(sent.client_msg_id, "c1");

    send(&mut bob, &request(ReqIdentifier::GetNewestSeq, "bob", "1", &()), false).await;
    let seq: GetNewestSeqResp = serde_json::from_slice(&recv(&mut bob, false).await.data).unwrap();
    assert_eq!(seq.max_seq, 1);

    let pull = PullMsgBySeqListReq {
        user_id: "bob".into(),
        seq_list: vec![seq.max_seq],
    };
    send(&mut bob, &request(ReqIdentifier::PullMsgBySeqList, "bob", "2", &pull), false).await;
    let resp = recv(&mut bob, false).await;
    assert_eq!(resp.msg_incr, "2");
    let pulled: PullMsgBySeqListResp = serde_json::from_slice(&resp.data).unwrap();
    assert_eq!(pulled.list.len(), 1);
    assert_eq!(pulled.list[0].content, b"hello bob".to_vec());

    alice.close(None).await.unwrap();
    bob.close(None).await.unwrap();
    wait_for_online(&state, 0).await;
}

#[tokio::test]
async fn test_forged_sender_is_ignored() {
    let (base, _state) = spawn_gateway().await;
    let mut alice = connect(&base, "alice", 1, false).await;

    send(&mut alice, &request(ReqIdentifier::GetNewestSeq, "mallory", "1", &()), false).await;
    send(&mut alice, &request(ReqIdentifier::GetNewestSeq, "alice", "2", &()), false).await;

    let resp = recv(&mut alice, false).await;
    assert_eq!(resp.msg_incr, "2");
}

#[tokio::test]
async fn test_second_login_on_same_platform_kicks_first() {
    let (base, state) = spawn_gateway().await;
    let mut first = connect(&base, "alice", 2, false).await;
    wait_for_online(&state, 1).await;
    let _second = connect(&base, "alice", 2, false).await;

    let kick = recv(&mut first, false).await;
    assert_eq!(kick.req_identifier, ReqIdentifier::KickOnlineMsg.code());

    // 旧连接随后被关闭
    let ended = timeout(WAIT, async {
        loop {
            match first.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    wait_for_online(&state, 1).await;
    assert!(state.registry.get_session("alice", 2).await.is_some());
}

#[tokio::test]
async fn test_invalid_handshake_is_rejected() {
    let (base, _state) = spawn_gateway().await;
    assert!(connect_async(format!("{base}?sendID=alice&platformID=42").as_str())
        .await
        .is_err());
    assert!(connect_async(format!("{base}?platformID=1").as_str()).await.is_err());
    assert!(
        connect_async(format!("{base}?sendID=alice&platformID=1&compression=zstd").as_str())
            .await
            .is_err()
    );
}
