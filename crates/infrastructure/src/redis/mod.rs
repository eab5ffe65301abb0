//! Redis 存储适配器
//!
//! 实现应用层的 [`application::KvStore`]，所有缓存组件共享同一个连接管理器。

mod error;
pub mod store;

pub use store::RedisStore;
