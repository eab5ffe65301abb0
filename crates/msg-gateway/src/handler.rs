//! 业务处理能力
//!
//! 会话只负责协议层：解码、鉴权、分发与回复。每个请求标识背后的业务逻辑由
//! [`MessageHandler`] 的实现提供。

use async_trait::async_trait;
use domain::Req;
use thiserror::Error;

/// 业务错误，原样写入响应的 `errCode`/`errMsg`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct HandlerError {
    pub code: i32,
    pub message: String,
}

impl HandlerError {
    pub const INTERNAL: i32 = 500;
    pub const ARGS: i32 = 1001;
    pub const NO_PERMISSION: i32 = 1002;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn args(message: impl Into<String>) -> Self {
        Self::new(Self::ARGS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }
}

/// 单个请求的上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub conn_id: String,
    pub operation_id: String,
    pub user_id: String,
    pub platform_id: i32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn get_seq(&self, ctx: &RequestContext, req: &Req) -> Result<Vec<u8>, HandlerError>;

    async fn send_msg(&self, ctx: &RequestContext, req: &Req) -> Result<Vec<u8>, HandlerError>;

    async fn send_signal_msg(&self, ctx: &RequestContext, req: &Req) -> Result<Vec<u8>, HandlerError>;

    async fn pull_msg_by_seq_list(
        &self,
        ctx: &RequestContext,
        req: &Req,
    ) -> Result<Vec<u8>, HandlerError>;

    async fn user_logout(&self, ctx: &RequestContext, req: &Req) -> Result<Vec<u8>, HandlerError>;

    /// 成功时同时返回新的前后台状态
    async fn set_background_status(
        &self,
        ctx: &RequestContext,
        req: &Req,
    ) -> Result<(Vec<u8>, bool), HandlerError>;
}
