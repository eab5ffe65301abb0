//! WebSocket 接入
//!
//! 握手参数 `sendID`、`platformID` 视为上游已认证的身份，
//! `compression=gzip` 开启该连接的压缩。

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use domain::Platform;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::handler::MessageHandler;
use crate::registry::SessionRegistry;
use crate::session::{ConnectionSession, GatewayContext};
use crate::transport::split_websocket;

#[derive(Clone)]
pub struct GatewayState {
    pub ctx: Arc<GatewayContext>,
    pub registry: Arc<SessionRegistry>,
}

impl GatewayState {
    /// 创建网关状态并启动注册表的注销循环，必须在 tokio 运行时内调用
    pub fn start(handler: Arc<dyn MessageHandler>, write_timeout: Duration) -> Self {
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(GatewayContext::new(handler, unregister_tx).with_write_timeout(write_timeout));
        let registry = Arc::new(SessionRegistry::new());
        tokio::spawn(registry.clone().run(unregister_rx));
        Self { ctx, registry }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    #[serde(rename = "sendID")]
    send_id: String,
    #[serde(rename = "platformID")]
    platform_id: i32,
    #[serde(default)]
    compression: Option<String>,
}

impl ConnectQuery {
    /// 校验握手参数，返回是否开启压缩
    fn compression(&self) -> Result<bool, String> {
        if self.send_id.is_empty() {
            return Err("sendID is required".to_string());
        }
        Platform::try_from(self.platform_id).map_err(|err| err.to_string())?;
        match self.compression.as_deref() {
            None | Some("") => Ok(false),
            Some("gzip") => Ok(true),
            Some(other) => Err(format!("unsupported compression: {other}")),
        }
    }
}

async fn websocket_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let compression = match query.compression() {
        Ok(compression) => compression,
        Err(message) => {
            tracing::warn!(send_id = %query.send_id, platform_id = query.platform_id, %message, "拒绝连接");
            return (StatusCode::BAD_REQUEST, message).into_response();
        }
    };
    ws.on_upgrade(move |socket| {
        serve_connection(state, socket, query.send_id, query.platform_id, compression)
    })
}

async fn serve_connection(
    state: GatewayState,
    socket: WebSocket,
    user_id: String,
    platform_id: i32,
    compression: bool,
) {
    let (source, sink) = split_websocket(socket);
    let session = ConnectionSession::new(user_id, platform_id, compression, Box::new(sink), state.ctx.clone());

    if let Some(previous) = state.registry.register(session.clone()).await {
        tokio::spawn(async move {
            previous.kick_online(&Uuid::new_v4().to_string()).await;
        });
    }
    session.run(Box::new(source)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(send_id: &str, platform_id: i32, compression: Option<&str>) -> ConnectQuery {
        ConnectQuery {
            send_id: send_id.into(),
            platform_id,
            compression: compression.map(str::to_string),
        }
    }

    #[test]
    fn test_connect_query_validation() {
        assert_eq!(query("alice", 1, None).compression(), Ok(false));
        assert_eq!(query("alice", 5, Some("gzip")).compression(), Ok(true));
        assert!(query("", 1, None).compression().is_err());
        assert!(query("alice", 99, None).compression().is_err());
        assert!(query("alice", 1, Some("brotli")).compression().is_err());
    }
}
