//! 长连接协议实体
//!
//! 定义帧类型、请求标识以及请求/响应信封。

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::encoding::base64_bytes;

/// 长连接帧
///
/// 与 WebSocket 操作码一一对应，只有二进制帧承载业务负载。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

impl Frame {
    pub const TEXT: u8 = 1;
    pub const BINARY: u8 = 2;
    pub const CLOSE: u8 = 8;
    pub const PING: u8 = 9;
    pub const PONG: u8 = 10;

    /// 帧的操作码
    pub fn opcode(&self) -> u8 {
        match self {
            Frame::Text(_) => Self::TEXT,
            Frame::Binary(_) => Self::BINARY,
            Frame::Close => Self::CLOSE,
            Frame::Ping(_) => Self::PING,
            Frame::Pong(_) => Self::PONG,
        }
    }
}

/// 请求标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReqIdentifier {
    GetNewestSeq,
    PullMsgBySeqList,
    SendMsg,
    SendSignalMsg,
    PushMsg,
    KickOnlineMsg,
    LogoutMsg,
    SetBackgroundStatus,
    DataError,
}

impl ReqIdentifier {
    /// 线格式上的整数编码
    pub fn code(self) -> i32 {
        match self {
            ReqIdentifier::GetNewestSeq => 1001,
            ReqIdentifier::PullMsgBySeqList => 1002,
            ReqIdentifier::SendMsg => 1003,
            ReqIdentifier::SendSignalMsg => 1004,
            ReqIdentifier::PushMsg => 2001,
            ReqIdentifier::KickOnlineMsg => 2002,
            ReqIdentifier::LogoutMsg => 2003,
            ReqIdentifier::SetBackgroundStatus => 2004,
            ReqIdentifier::DataError => 3001,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let identifier = match code {
            1001 => ReqIdentifier::GetNewestSeq,
            1002 => ReqIdentifier::PullMsgBySeqList,
            1003 => ReqIdentifier::SendMsg,
            1004 => ReqIdentifier::SendSignalMsg,
            2001 => ReqIdentifier::PushMsg,
            2002 => ReqIdentifier::KickOnlineMsg,
            2003 => ReqIdentifier::LogoutMsg,
            2004 => ReqIdentifier::SetBackgroundStatus,
            3001 => ReqIdentifier::DataError,
            _ => return None,
        };
        Some(identifier)
    }
}

/// 客户端请求信封
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Req {
    #[serde(rename = "reqIdentifier")]
    #[validate(range(min = 1))]
    pub req_identifier: i32,
    #[serde(default)]
    pub token: String,
    #[serde(rename = "sendID")]
    #[validate(length(min = 1))]
    pub send_id: String,
    #[serde(rename = "operationID")]
    #[validate(length(min = 1))]
    pub operation_id: String,
    #[serde(rename = "msgIncr")]
    #[validate(length(min = 1))]
    pub msg_incr: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
}

impl Req {
    pub fn identifier(&self) -> Option<ReqIdentifier> {
        ReqIdentifier::from_code(self.req_identifier)
    }
}

/// 服务端响应信封
///
/// 总是回显请求的标识、`msgIncr` 与 `operationID`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resp {
    #[serde(rename = "reqIdentifier")]
    pub req_identifier: i32,
    #[serde(rename = "msgIncr")]
    pub msg_incr: String,
    #[serde(rename = "operationID")]
    pub operation_id: String,
    #[serde(rename = "errCode", default)]
    pub err_code: i32,
    #[serde(rename = "errMsg", default)]
    pub err_msg: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
}

impl Resp {
    /// 基于请求构造响应，回显关联字段
    pub fn reply_to(req: &Req) -> Self {
        Self {
            req_identifier: req.req_identifier,
            msg_incr: req.msg_incr.clone(),
            operation_id: req.operation_id.clone(),
            ..Default::default()
        }
    }

    /// 服务端主动下发的响应（推送、踢下线）
    pub fn server_push(identifier: ReqIdentifier, operation_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            req_identifier: identifier.code(),
            operation_id: operation_id.into(),
            data,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.err_code == 0
    }
}
