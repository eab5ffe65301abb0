use domain::DomainError;
use thiserror::Error;

use crate::store::StoreError;

/// 缓存组件错误
///
/// `NotFound` 是正常的、携带信息的结果（未初始化的水位、未命中、锁不存在），
/// 与真正的存储故障 (`Store`) 以及序列化故障区分开。
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key not found: {key}")]
    NotFound { key: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid session type: {0}")]
    InvalidSessionType(i32),
    #[error("lock already held: {key}")]
    LockHeld { key: String },
    #[error("invalid value under {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl CacheError {
    pub fn not_found(key: impl Into<String>) -> Self {
        CacheError::NotFound { key: key.into() }
    }

    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        CacheError::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

impl From<DomainError> for CacheError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::UnknownSessionType { value } => CacheError::InvalidSessionType(value),
            other => CacheError::invalid_value("domain", other.to_string()),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
