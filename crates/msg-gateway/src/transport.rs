//! 帧级传输抽象
//!
//! 会话只依赖读端 [`FrameSource`] 与写端 [`FrameSink`]，生产环境由 axum 的
//! WebSocket 拆分得到。读端阻塞且没有超时，唯一的取消方式是关闭底层连接。

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use domain::Frame;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::error::TransportError;

#[async_trait]
pub trait FrameSource: Send {
    /// 读取下一帧，连接结束时返回 `None`
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// 关闭连接，重复调用无副作用
    async fn close(&mut self);
}

/// 拆分 axum WebSocket 为读写两端
pub fn split_websocket(socket: WebSocket) -> (AxumFrameSource, AxumFrameSink) {
    let (sink, stream) = socket.split();
    (
        AxumFrameSource { inner: stream },
        AxumFrameSink {
            inner: sink,
            closed: false,
        },
    )
}

pub struct AxumFrameSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for AxumFrameSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let message = match self.inner.next().await? {
            Ok(message) => message,
            Err(err) => return Some(Err(TransportError::io(err.to_string()))),
        };
        let frame = match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(data) => Frame::Ping(data.to_vec()),
            Message::Pong(data) => Frame::Pong(data.to_vec()),
            Message::Close(_) => Frame::Close,
        };
        Some(Ok(frame))
    }
}

pub struct AxumFrameSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for AxumFrameSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(None),
        };
        self.inner
            .send(message)
            .await
            .map_err(|err| TransportError::io(err.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.inner.close().await {
            tracing::debug!(error = %err, "关闭 WebSocket 写端失败");
        }
    }
}
