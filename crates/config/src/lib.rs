//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> 可选配置文件（`APP_CONFIG_FILE`，按扩展名识别
//! yaml/json/toml）-> 环境变量 `APP_*`（嵌套字段用 `__` 分隔，
//! 例如 `APP_REDIS__URL`）。加载完成后统一校验。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub redis: RedisConfig,
    #[serde(default)]
    #[validate(nested)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,
}

/// 监听地址
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 10001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedisConfig {
    #[validate(url)]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
        }
    }
}

/// 长连接网关配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// 单次写帧的超时时间（秒）
    #[validate(range(min = 1))]
    pub write_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            write_timeout_secs: 60,
        }
    }
}

impl GatewayConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// 缓存过期时间配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// 消息缓存 TTL（秒）
    #[validate(range(min = 1))]
    pub msg_cache_timeout_secs: u64,
    /// 信令邀请的响铃超时（秒）
    #[validate(range(min = 1))]
    pub signal_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            msg_cache_timeout_secs: 86400,
            signal_timeout_secs: 35,
        }
    }
}

impl CacheConfig {
    pub fn msg_cache_timeout(&self) -> Duration {
        Duration::from_secs(self.msg_cache_timeout_secs)
    }

    pub fn signal_timeout(&self) -> Duration {
        Duration::from_secs(self.signal_timeout_secs)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的优先级加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        Self::from_figment(fig.merge(Env::prefixed("APP_").split("__")))
    }

    pub fn from_figment(fig: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = fig.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 日志用的脱敏表示，隐藏 Redis 密码
    pub fn sanitize(&self) -> String {
        let mut text = format!("{:?}", self);
        if let Some(at) = self.redis.url.find('@') {
            let scheme_end = self.redis.url.find("://").map(|i| i + 3).unwrap_or(0);
            if scheme_end < at {
                let redacted = format!(
                    "{}[REDACTED]{}",
                    &self.redis.url[..scheme_end],
                    &self.redis.url[at..]
                );
                text = text.replace(&self.redis.url, &redacted);
            }
        }
        text
    }
}
