//! 长连接会话
//!
//! 每个已接受的连接对应一个 [`ConnectionSession`]。会话在独立任务中运行读循环，
//! 写出经由会话内的互斥锁串行化，读写可以并发进行。
//!
//! 生命周期为 Open → Closing → Closed。从 Open 到 Closing 只有一次成功的
//! CAS，赢得这次 CAS 的一方负责释放连接并把会话交给注销通道，
//! 因此无论是关闭帧、读错误、显式关闭还是读循环 panic，注销都只发生一次。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::{Frame, MsgData, Req, ReqIdentifier, Resp};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;
use validator::Validate;

use crate::codec::{Compressor, Encoder, GzipCompressor, JsonEncoder};
use crate::error::{CodecError, SessionError};
use crate::handler::{MessageHandler, RequestContext};
use crate::transport::{FrameSink, FrameSource};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

pub type UnregisterSender = mpsc::UnboundedSender<Arc<ConnectionSession>>;
pub type UnregisterReceiver = mpsc::UnboundedReceiver<Arc<ConnectionSession>>;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// 所有会话共享的依赖
pub struct GatewayContext {
    pub handler: Arc<dyn MessageHandler>,
    pub encoder: Arc<dyn Encoder>,
    pub compressor: Arc<dyn Compressor>,
    pub write_timeout: Duration,
    unregister_tx: UnregisterSender,
}

impl GatewayContext {
    pub fn new(handler: Arc<dyn MessageHandler>, unregister_tx: UnregisterSender) -> Self {
        Self {
            handler,
            encoder: Arc::new(JsonEncoder),
            compressor: Arc::new(GzipCompressor),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            unregister_tx,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

pub struct ConnectionSession {
    conn_id: String,
    user_id: String,
    platform_id: i32,
    compression: bool,
    online_at: DateTime<Utc>,
    background: AtomicBool,
    state: AtomicU8,
    writer: Mutex<Box<dyn FrameSink>>,
    ctx: Arc<GatewayContext>,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("conn_id", &self.conn_id)
            .field("user_id", &self.user_id)
            .field("platform_id", &self.platform_id)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionSession {
    /// `user_id` 必须是上游已经认证过的身份
    pub fn new(
        user_id: impl Into<String>,
        platform_id: i32,
        compression: bool,
        sink: Box<dyn FrameSink>,
        ctx: Arc<GatewayContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            platform_id,
            compression,
            online_at: Utc::now(),
            background: AtomicBool::new(false),
            state: AtomicU8::new(OPEN),
            writer: Mutex::new(sink),
            ctx,
        })
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn platform_id(&self) -> i32 {
        self.platform_id
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn online_at(&self) -> DateTime<Utc> {
        self.online_at
    }

    /// 客户端是否处于后台，供离线推送决策使用
    pub fn is_background(&self) -> bool {
        self.background.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            OPEN => SessionState::Open,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    /// 运行读循环直到连接结束
    ///
    /// 无论以何种方式退出（包括 panic 与 future 被丢弃），会话都会进入关闭流程并注销一次。
    pub async fn run(self: Arc<Self>, mut source: Box<dyn FrameSource>) {
        let guard = CloseGuard {
            session: Some(self.clone()),
        };
        tracing::info!(
            conn_id = %self.conn_id,
            user_id = %self.user_id,
            platform_id = self.platform_id,
            compression = self.compression,
            "长连接已建立"
        );

        let outcome = AssertUnwindSafe(self.read_loop(source.as_mut()))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            tracing::error!(conn_id = %self.conn_id, user_id = %self.user_id, "读循环异常退出");
        }
        drop(source);

        self.close().await;
        guard.disarm();
    }

    async fn read_loop(&self, source: &mut dyn FrameSource) {
        while self.is_open() {
            let frame = match source.next_frame().await {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    tracing::warn!(conn_id = %self.conn_id, error = %err, "读取帧失败");
                    return;
                }
                None => {
                    tracing::debug!(conn_id = %self.conn_id, "连接已被对端关闭");
                    return;
                }
            };

            match frame {
                Frame::Binary(data) if data.is_empty() => {}
                Frame::Binary(data) => self.handle_binary(data).await,
                Frame::Text(_) | Frame::Ping(_) | Frame::Pong(_) => {}
                Frame::Close => {
                    tracing::info!(conn_id = %self.conn_id, user_id = %self.user_id, "收到关闭帧");
                    return;
                }
            }
        }
    }

    async fn handle_binary(&self, data: Vec<u8>) {
        let raw = if self.compression {
            match self.ctx.compressor.decompress(&data) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(conn_id = %self.conn_id, error = %err, "解压失败，丢弃消息");
                    return;
                }
            }
        } else {
            data
        };

        let req = match self.ctx.encoder.decode(&raw) {
            Ok(req) => req,
            Err(err) => {
                tracing::warn!(conn_id = %self.conn_id, error = %err, "解码失败，丢弃消息");
                return;
            }
        };
        if let Err(err) = req.validate() {
            tracing::warn!(conn_id = %self.conn_id, error = %err, "请求校验失败，丢弃消息");
            return;
        }
        if req.send_id != self.user_id {
            tracing::warn!(
                conn_id = %self.conn_id,
                user_id = %self.user_id,
                send_id = %req.send_id,
                "sendID 与连接身份不一致，丢弃消息"
            );
            return;
        }

        let Some(resp) = self.dispatch(&req).await else {
            return;
        };
        if let Err(err) = self.write_resp(&resp).await {
            tracing::warn!(
                conn_id = %self.conn_id,
                operation_id = %req.operation_id,
                error = %err,
                "写回响应失败"
            );
        }
    }

    /// 按请求标识分发，未知标识返回 `None`
    async fn dispatch(&self, req: &Req) -> Option<Resp> {
        let ctx = RequestContext {
            conn_id: self.conn_id.clone(),
            operation_id: req.operation_id.clone(),
            user_id: self.user_id.clone(),
            platform_id: self.platform_id,
        };
        let handler = &self.ctx.handler;

        let result = match req.identifier() {
            Some(ReqIdentifier::GetNewestSeq) => handler.get_seq(&ctx, req).await,
            Some(ReqIdentifier::SendMsg) => handler.send_msg(&ctx, req).await,
            Some(ReqIdentifier::SendSignalMsg) => handler.send_signal_msg(&ctx, req).await,
            Some(ReqIdentifier::PullMsgBySeqList) => handler.pull_msg_by_seq_list(&ctx, req).await,
            Some(ReqIdentifier::LogoutMsg) => handler.user_logout(&ctx, req).await,
            Some(ReqIdentifier::SetBackgroundStatus) => handler
                .set_background_status(&ctx, req)
                .await
                .map(|(data, background)| {
                    self.background.store(background, Ordering::Release);
                    data
                }),
            Some(
                ReqIdentifier::PushMsg | ReqIdentifier::KickOnlineMsg | ReqIdentifier::DataError,
            )
            | None => {
                tracing::warn!(
                    conn_id = %self.conn_id,
                    operation_id = %req.operation_id,
                    req_identifier = req.req_identifier,
                    "未知的请求标识"
                );
                return None;
            }
        };

        let mut resp = Resp::reply_to(req);
        match result {
            Ok(data) => resp.data = data,
            Err(err) => {
                tracing::info!(
                    conn_id = %self.conn_id,
                    operation_id = %req.operation_id,
                    error = %err,
                    "业务处理返回错误"
                );
                resp.err_code = err.code;
                resp.err_msg = err.message;
            }
        }
        Some(resp)
    }

    /// 编码、按需压缩并在写超时内写出；会话已不处于 Open 时静默忽略
    pub async fn write_resp(&self, resp: &Resp) -> Result<(), SessionError> {
        if !self.is_open() {
            return Ok(());
        }
        let mut bytes = self.ctx.encoder.encode(resp)?;
        if self.compression {
            bytes = self.ctx.compressor.compress(&bytes)?;
        }

        let mut writer = self.writer.lock().await;
        if !self.is_open() {
            return Ok(());
        }
        let timeout = self.ctx.write_timeout;
        tokio::time::timeout(timeout, writer.send_frame(Frame::Binary(bytes)))
            .await
            .map_err(|_| SessionError::WriteTimeout(timeout))??;
        Ok(())
    }

    /// 服务端主动推送一条消息
    pub async fn push_message(&self, operation_id: &str, msg: &MsgData) -> Result<(), SessionError> {
        let data = serde_json::to_vec(msg).map_err(CodecError::Encode)?;
        let resp = Resp::server_push(ReqIdentifier::PushMsg, operation_id, data);
        self.write_resp(&resp).await
    }

    /// 通知客户端被挤下线，然后关闭会话
    pub async fn kick_online(self: &Arc<Self>, operation_id: &str) {
        let resp = Resp::server_push(ReqIdentifier::KickOnlineMsg, operation_id, Vec::new());
        if let Err(err) = self.write_resp(&resp).await {
            tracing::warn!(conn_id = %self.conn_id, error = %err, "发送下线通知失败");
        }
        tracing::info!(conn_id = %self.conn_id, user_id = %self.user_id, "连接被踢下线");
        self.close().await;
    }

    /// 关闭会话，可重复调用
    ///
    /// 只有第一次调用会释放连接并交给注销通道。释放在独立任务中进行，
    /// 调用方的 future 被取消也不影响注销。
    pub async fn close(self: &Arc<Self>) {
        let Some(release) = self.begin_close() else {
            return;
        };
        if let Err(err) = release.await {
            tracing::error!(conn_id = %self.conn_id, error = %err, "释放连接的任务异常退出");
        }
    }

    /// Open → Closing 的唯一入口，成功时启动释放任务
    fn begin_close(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(self.clone().finish_close())),
            Err(_) => {
                self.clone().hand_off();
                None
            }
        }
    }

    /// 释放连接最多等待一个写超时，之后无论结果如何都交出会话
    async fn finish_close(self: Arc<Self>) {
        let timeout = self.ctx.write_timeout;
        let release = async {
            self.writer.lock().await.close().await;
        };
        match tokio::time::timeout(timeout, AssertUnwindSafe(release).catch_unwind()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!(conn_id = %self.conn_id, "释放连接时发生 panic"),
            Err(_) => tracing::warn!(conn_id = %self.conn_id, ?timeout, "释放连接超时"),
        }
        self.hand_off();
    }

    fn hand_off(self: Arc<Self>) {
        let conn_id = self.conn_id.clone();
        let unregister_tx = self.ctx.unregister_tx.clone();
        self.state.store(CLOSED, Ordering::Release);
        if unregister_tx.send(self).is_err() {
            tracing::warn!(conn_id = %conn_id, "注销通道已关闭");
        }
        tracing::info!(conn_id = %conn_id, "长连接已关闭");
    }
}

/// `run` 的 future 在读循环结束前被丢弃时，保证会话仍然进入关闭流程
struct CloseGuard {
    session: Option<Arc<ConnectionSession>>,
}

impl CloseGuard {
    fn disarm(mut self) {
        self.session = None;
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        // 已经处于 Closing 时，释放任务早已启动
        if let Some(session) = self.session.take() {
            let _ = session.begin_close();
        }
    }
}
