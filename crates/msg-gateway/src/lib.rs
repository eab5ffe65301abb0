//! 长连接网关
//!
//! 负责 WebSocket 会话的协议层：帧读取、解压解码、身份校验、按请求标识分发、
//! 写回响应，以及会话关闭后的注销。业务处理通过 [`MessageHandler`] 注入。

pub mod codec;
pub mod error;
pub mod handler;
pub mod payload;
pub mod registry;
pub mod server;
pub mod session;
pub mod store_handler;
pub mod transport;

pub use codec::{Compressor, Encoder, GzipCompressor, JsonEncoder};
pub use error::{CodecError, SessionError, TransportError};
pub use handler::{HandlerError, MessageHandler, RequestContext};
pub use registry::SessionRegistry;
pub use server::{router, GatewayState};
pub use session::{ConnectionSession, GatewayContext, SessionState};
pub use store_handler::StoreBackedHandler;
pub use transport::{FrameSink, FrameSource};
