//! 序列号与投递缓存子系统。
//!
//! 这里的组件都是无状态的请求整形器：它们只负责把领域操作翻译成对
//! 同一个外部 KV 存储（支持 TTL）的命令，存储句柄通过构造函数注入。

pub mod error;
pub mod message_cache;
pub mod push_routing;
pub mod reaction;
pub mod sequence;
pub mod signal;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use message_cache::{CachedMessages, MessageCache};
pub use push_routing::{PlatformTokens, ProviderToken, PushRoutingRegistry};
pub use reaction::ReactionStore;
pub use sequence::SequenceAllocator;
pub use signal::SignalInviteQueue;
pub use store::{Batch, Command, KvStore, Reply, StoreError, StoreResult};
