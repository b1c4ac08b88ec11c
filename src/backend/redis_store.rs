//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的KV存储实现。

use super::redis_provider::{DefaultRedisProvider, RedisProvider};
use super::{KeyTtl, KvStore};
use crate::config::{KvConfig, KvMode};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Redis KV存储
///
/// 单机或哨兵模式，所有命令受 `command_timeout_ms` 约束
#[derive(Clone)]
pub struct RedisKvStore {
    client: Client,
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvStore")
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisKvStore {
    /// 创建新的Redis存储实例
    ///
    /// # 参数
    ///
    /// * `config` - KV存储配置
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &KvConfig) -> Result<Self> {
        Self::new_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的Redis提供者创建实例
    #[instrument(skip(config, provider), level = "info", fields(mode = ?config.mode))]
    pub async fn new_with_provider(
        config: &KvConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        debug!("Initializing RedisKvStore with mode: {:?}", config.mode);
        let (client, manager) = match config.mode {
            KvMode::Standalone => provider.get_standalone_client(config).await?,
            KvMode::Sentinel => provider.get_sentinel_client(config).await?,
            KvMode::Memory => {
                return Err(SyncError::ConfigError(
                    "kv mode 'memory' does not use Redis".to_string(),
                ))
            }
        };
        Ok(Self {
            client,
            manager,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    /// 获取底层客户端
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(res) => res.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(format!(
                "redis {} exceeded {}ms",
                op,
                self.command_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        self.bounded("GET", conn.get(key)).await
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl);
        }
        self.bounded("SET", cmd.query_async::<()>(&mut conn)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl);
        self.bounded("EXPIRE", cmd.query_async::<bool>(&mut conn))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.manager.clone();
        let raw: i64 = self.bounded("TTL", conn.ttl(key)).await?;
        Ok(KeyTtl::from_redis(raw))
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);
        self.bounded("SCAN", cmd.query_async::<(u64, Vec<String>)>(&mut conn))
            .await
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.bounded("DEL", cmd.query_async::<usize>(&mut conn))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let response: String = self
            .bounded("PING", redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        debug!("Redis ping response: {}", response);
        Ok(())
    }
}
