//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步系统的错误类型和处理机制。

use thiserror::Error;

/// 同步系统错误类型枚举
///
/// 定义了缓存层、持久层和同步引擎中可能发生的各种错误类型
#[derive(Error, Debug)]
pub enum SyncError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 负载解码失败（数据格式错误，不可重试）
    #[error("Decode error for '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// 业务校验失败（如余额不足）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 键格式不合法
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// KV存储操作失败
    #[error("KV operation failed: {0}")]
    KvError(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Sea-ORM数据库错误
    #[error("Sea-ORM error: {0}")]
    SeaOrmError(#[from] sea_orm::DbErr),

    /// 数据库错误
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    /// 绑定到具体键的错误，批处理时用于定位失败的键
    #[error("{key}: {source}")]
    AtKey {
        key: String,
        #[source]
        source: Box<SyncError>,
    },
}

/// 错误分类
///
/// 决定批处理中失败条目的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 暂时性故障，下一轮同步会重试
    Transient,
    /// 数据格式错误，记录后跳过
    Decode,
    /// 业务校验失败，调用方可见
    Validation,
    /// 配置或生命周期错误
    Fatal,
}

impl SyncError {
    /// 将错误绑定到指定键
    pub fn at_key(key: impl Into<String>, source: SyncError) -> Self {
        SyncError::AtKey {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// 创建解码错误
    pub fn decode(key: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Decode {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// 返回错误绑定的键（如果有）
    pub fn key(&self) -> Option<&str> {
        match self {
            SyncError::AtKey { key, .. } | SyncError::Decode { key, .. } => Some(key),
            _ => None,
        }
    }

    /// 获取错误分类
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::AtKey { source, .. } => source.class(),
            SyncError::Decode { .. } | SyncError::Serialization(_) => ErrorClass::Decode,
            SyncError::Validation(_) | SyncError::InvalidKey(_) => ErrorClass::Validation,
            SyncError::ConfigError(_) | SyncError::ShutdownError(_) => ErrorClass::Fatal,
            SyncError::KvError(_)
            | SyncError::RedisError(_)
            | SyncError::SeaOrmError(_)
            | SyncError::DatabaseError(_)
            | SyncError::Timeout(_)
            | SyncError::IoError(_) => ErrorClass::Transient,
        }
    }

    /// 是否为可重试的暂时性错误
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// 同步操作结果类型别名
pub type Result<T> = std::result::Result<T, SyncError>;
