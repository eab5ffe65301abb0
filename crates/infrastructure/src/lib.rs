//! 基础设施层实现。
//!
//! 提供应用层存储能力的 Redis 适配器。

pub mod redis;

pub use crate::redis::RedisStore;
