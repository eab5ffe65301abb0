//! 后端 KV 存储能力
//!
//! 所有缓存组件共享同一个支持 TTL 的外部 KV 存储。这里定义组件依赖的
//! 最小命令集合，生产环境由 Redis 实现，测试使用 [`memory::MemoryStore`]。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误
///
/// 只表示真正的故障；键不存在通过 `Option` 等返回值表达。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// 连接错误
    #[error("存储连接错误: {message}")]
    Connection { message: String },

    /// 命令执行错误
    #[error("存储命令错误: {message}")]
    Command { message: String },

    /// 键上保存的值类型与命令不匹配
    #[error("键 {key} 的值类型不匹配")]
    WrongType { key: String },
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection {
            message: message.into(),
        }
    }

    pub fn command(message: impl Into<String>) -> Self {
        StoreError::Command {
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 批量提交中的单条命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { key: String },
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    Del { key: String },
    LPush { key: String, value: String },
    Expire { key: String, ttl: Duration },
}

/// 单条命令的返回值
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Ok,
    Bytes(Vec<u8>),
    Int(i64),
}

/// 管道批量提交
///
/// 各命令独立执行，不具备事务性：部分失败不会回滚已经生效的命令。
#[derive(Debug, Clone, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Del { key: key.into() });
        self
    }

    pub fn lpush(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.commands.push(Command::LPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.commands.push(Command::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// 支持 TTL 的 KV 存储能力
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// `ttl` 为 `None` 时写入永久值（同时清除旧的过期时间）
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// 仅当键不存在时写入，返回是否写入成功
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<bool>;

    /// 原子自增并返回自增后的值
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// 返回键是否存在并成功设置过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// 返回实际删除的键数量
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// 按 glob 模式扫描键空间
    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hdel(&self, key: &str, fields: &[String]) -> StoreResult<()>;

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn lpop(&self, key: &str) -> StoreResult<Option<String>>;

    /// 管道提交，按命令顺序返回每条命令各自的结果
    ///
    /// 外层错误表示整个批次未能提交。
    async fn execute(&self, batch: Batch) -> StoreResult<Vec<StoreResult<Reply>>>;
}

/// 内存实现的 KV 存储（用于测试）
pub mod memory {
    use super::*;
    use globset::{GlobBuilder, GlobMatcher};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone)]
    enum Value {
        Bytes(Vec<u8>),
        Hash(HashMap<String, String>),
        List(VecDeque<String>),
    }

    #[derive(Debug, Clone)]
    struct Entry {
        value: Value,
        expires_at: Option<Instant>,
    }

    impl Entry {
        fn is_expired(&self, now: Instant) -> bool {
            self.expires_at.is_some_and(|deadline| deadline <= now)
        }
    }

    /// 过期时间基于 `tokio::time`，测试中可以暂停并推进时钟。
    #[derive(Default)]
    pub struct MemoryStore {
        entries: Mutex<HashMap<String, Entry>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 键的剩余存活时间，永久键或不存在时返回 `None`
        pub async fn ttl(&self, key: &str) -> Option<Duration> {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            live(&mut entries, key, now)
                .and_then(|entry| entry.expires_at)
                .map(|deadline| deadline.saturating_duration_since(now))
        }

        /// 当前未过期的键数量
        pub async fn len(&self) -> usize {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            entries.retain(|_, entry| !entry.is_expired(now));
            entries.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.len().await == 0
        }
    }

    fn purge(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        purge(entries, key, now);
        entries.get_mut(key)
    }

    fn live_or_insert<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
        empty: fn() -> Value,
    ) -> &'a mut Entry {
        purge(entries, key, now);
        entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: empty(),
            expires_at: None,
        })
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }

    fn get_bytes(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> StoreResult<Option<Vec<u8>>> {
        match live(entries, key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set_bytes(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        now: Instant,
    ) {
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
    }

    fn expire_key(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        ttl: Duration,
        now: Instant,
    ) -> bool {
        match live(entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        }
    }

    fn lpush_value(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: &str,
        now: Instant,
    ) -> StoreResult<i64> {
        let entry = live_or_insert(entries, key, now, || Value::List(VecDeque::new()));
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len() as i64)
            }
            _ => Err(wrong_type(key)),
        }
    }

    /// 按 Redis SCAN MATCH 的语义编译 glob：`*` 可跨越任意字符，反斜杠转义
    fn compile_pattern(pattern: &str) -> StoreResult<GlobMatcher> {
        GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map(|glob| glob.compile_matcher())
            .map_err(|err| StoreError::command(format!("invalid pattern {pattern}: {err}")))
    }

    #[async_trait]
    impl KvStore for MemoryStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            let mut entries = self.entries.lock().await;
            get_bytes(&mut entries, key, Instant::now())
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
            let mut entries = self.entries.lock().await;
            set_bytes(&mut entries, key, value, ttl, Instant::now());
            Ok(())
        }

        async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<bool> {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            if live(&mut entries, key, now).is_some() {
                return Ok(false);
            }
            set_bytes(&mut entries, key, value, Some(ttl), now);
            Ok(true)
        }

        async fn incr(&self, key: &str) -> StoreResult<i64> {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            let (current, expires_at) = match live(&mut entries, key, now) {
                None => (0, None),
                Some(Entry {
                    value: Value::Bytes(bytes),
                    expires_at,
                }) => {
                    let current = std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|raw| raw.parse::<i64>().ok())
                        .ok_or_else(|| {
                            StoreError::command("value is not an integer or out of range")
                        })?;
                    (current, *expires_at)
                }
                Some(_) => return Err(wrong_type(key)),
            };
            let next = current
                .checked_add(1)
                .ok_or_else(|| StoreError::command("increment would overflow"))?;
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Bytes(next.to_string().into_bytes()),
                    expires_at,
                },
            );
            Ok(next)
        }

        async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
            let mut entries = self.entries.lock().await;
            Ok(expire_key(&mut entries, key, ttl, Instant::now()))
        }

        async fn del(&self, keys: &[String]) -> StoreResult<u64> {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            let mut removed = 0;
            for key in keys {
                if live(&mut entries, key, now).is_some() {
                    entries.remove(key);
                    removed += 1;
                }
            }
            Ok(removed)
        }

        async fn exists(&self, key: &str) -> StoreResult<bool> {
            let mut entries = self.entries.lock().await;
            Ok(live(&mut entries, key, Instant::now()).is_some())
        }

        async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
            let matcher = compile_pattern(pattern)?;
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            entries.retain(|_, entry| !entry.is_expired(now));
            Ok(entries
                .keys()
                .filter(|key| matcher.is_match(key.as_str()))
                .cloned()
                .collect())
        }

        async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
            let mut entries = self.entries.lock().await;
            match live(&mut entries, key, Instant::now()) {
                None => Ok(None),
                Some(Entry {
                    value: Value::Hash(hash),
                    ..
                }) => Ok(hash.get(field).cloned()),
                Some(_) => Err(wrong_type(key)),
            }
        }

        async fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            let entry = live_or_insert(&mut entries, key, now, || Value::Hash(HashMap::new()));
            match &mut entry.value {
                Value::Hash(hash) => {
                    for (field, value) in fields {
                        hash.insert(field.clone(), value.clone());
                    }
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        }

        async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
            let mut entries = self.entries.lock().await;
            match live(&mut entries, key, Instant::now()) {
                None => Ok(HashMap::new()),
                Some(Entry {
                    value: Value::Hash(hash),
                    ..
                }) => Ok(hash.clone()),
                Some(_) => Err(wrong_type(key)),
            }
        }

        async fn hdel(&self, key: &str, fields: &[String]) -> StoreResult<()> {
            let mut entries = self.entries.lock().await;
            let emptied = match live(&mut entries, key, Instant::now()) {
                None => return Ok(()),
                Some(Entry {
                    value: Value::Hash(hash),
                    ..
                }) => {
                    for field in fields {
                        hash.remove(field);
                    }
                    hash.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if emptied {
                entries.remove(key);
            }
            Ok(())
        }

        async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
            let mut entries = self.entries.lock().await;
            lpush_value(&mut entries, key, value, Instant::now()).map(|_| ())
        }

        async fn lpop(&self, key: &str) -> StoreResult<Option<String>> {
            let mut entries = self.entries.lock().await;
            let (popped, emptied) = match live(&mut entries, key, Instant::now()) {
                None => return Ok(None),
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => {
                    let popped = list.pop_front();
                    (popped, list.is_empty())
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if emptied {
                entries.remove(key);
            }
            Ok(popped)
        }

        async fn execute(&self, batch: Batch) -> StoreResult<Vec<StoreResult<Reply>>> {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            let replies = batch
                .into_commands()
                .into_iter()
                .map(|command| match command {
                    Command::Get { key } => get_bytes(&mut entries, &key, now)
                        .map(|value| value.map_or(Reply::Nil, Reply::Bytes)),
                    Command::Set { key, value, ttl } => {
                        set_bytes(&mut entries, &key, value, ttl, now);
                        Ok(Reply::Ok)
                    }
                    Command::Del { key } => {
                        let removed = live(&mut entries, &key, now).is_some();
                        entries.remove(&key);
                        Ok(Reply::Int(i64::from(removed)))
                    }
                    Command::LPush { key, value } => {
                        lpush_value(&mut entries, &key, &value, now).map(Reply::Int)
                    }
                    Command::Expire { key, ttl } => Ok(Reply::Int(i64::from(expire_key(
                        &mut entries,
                        &key,
                        ttl,
                        now,
                    )))),
                })
                .collect();
            Ok(replies)
        }
    }

}
