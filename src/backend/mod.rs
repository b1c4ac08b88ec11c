//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了KV存储后端接口及其实现：Redis与进程内存储。

pub mod memory;
pub mod redis_provider;
pub mod redis_store;

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

pub use self::memory::MemoryKvStore;
pub use self::redis_store::RedisKvStore;

/// 键的剩余生存时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// 键不存在
    Missing,
    /// 键存在但没有过期时间
    Persistent,
    /// 剩余秒数
    Expiring(u64),
}

impl KeyTtl {
    /// 从Redis TTL返回值转换（-2 不存在，-1 无过期时间）
    pub fn from_redis(raw: i64) -> Self {
        match raw {
            -2 => KeyTtl::Missing,
            n if n < 0 => KeyTtl::Persistent,
            n => KeyTtl::Expiring(n as u64),
        }
    }
}

/// KV存储接口
///
/// 所有操作都是异步且有界的；实现自行负责超时
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 读取原始负载
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入原始负载，`ttl` 为 None 时键永不过期（并清除已有TTL）
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()>;

    /// 设置过期时间，键不存在时返回 false
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool>;

    /// 查询剩余生存时间
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// 游标扫描一页匹配的键，返回下一游标（0表示结束）
    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>)>;

    /// 批量删除，返回实际删除的数量；删除不存在的键不是错误
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// 健康检查
    async fn ping(&self) -> Result<()>;
}

/// 将游标扫描转换为惰性的键流
///
/// 单次遍历、不可重启、无快照隔离；某页出错时产出该错误并结束
pub fn scan_keys<'a>(
    kv: &'a dyn KvStore,
    pattern: String,
    count: usize,
) -> BoxStream<'a, Result<String>> {
    stream::unfold(Some(0u64), move |cursor| {
        let pattern = pattern.clone();
        async move {
            let cursor = cursor?;
            match kv.scan(&pattern, cursor, count).await {
                Ok((0, keys)) => Some((Ok(keys), None)),
                Ok((next, keys)) => Some((Ok(keys), Some(next))),
                Err(e) => Some((Err(e), None)),
            }
        }
    })
    .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<String, SyncError>)))
    .try_flatten()
    .boxed()
}
