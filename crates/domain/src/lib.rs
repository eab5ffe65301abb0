//! 即时通讯实时核心的领域模型
//!
//! 包含长连接请求/响应信封、帧类型、缓存消息、信令邀请、
//! 推送平台以及会话类型等核心定义。

pub mod entities;
pub mod errors;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
