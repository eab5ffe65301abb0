//! 领域实体定义
//!
//! 包含长连接协议、缓存消息、信令和推送路由相关的实体。

pub mod encoding;
pub mod message;
pub mod platform;
pub mod session_type;
pub mod signal;
pub mod websocket;

// 重新导出核心实体
pub use message::{MsgData, MsgStatus};
pub use platform::Platform;
pub use session_type::SessionType;
pub use signal::{
    Invitation, SignalAcceptReq, SignalCancelReq, SignalHungUpReq, SignalInviteInGroupReq,
    SignalInviteReq, SignalRejectReq, SignalReq,
};
pub use websocket::{Frame, Req, ReqIdentifier, Resp};
