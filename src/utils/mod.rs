//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! - 按键串行化的异步锁
//! - 带超时的操作包装
//! - 日志脱敏

pub mod keyed_lock;
pub mod redaction;

pub use keyed_lock::{KeyedGuard, KeyedLock};

use crate::error::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

/// 为存储操作加上超时上限
///
/// 超时返回 `SyncError::Timeout`，其余结果原样返回
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::Timeout(format!(
            "{} exceeded {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

/// 当前Unix时间戳（秒）
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
