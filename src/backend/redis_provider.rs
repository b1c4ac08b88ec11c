//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者：根据KV配置拼出连接地址并建立连接管理器。

use crate::{
    config::KvConfig,
    error::{Result, SyncError},
    utils::redaction::redact_connection_string,
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};
use tracing::info;

/// Redis连接提供者
///
/// 负责建立连接管理器，便于在测试中替换
#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn get_standalone_client(&self, config: &KvConfig) -> Result<(Client, ConnectionManager)>;
    async fn get_sentinel_client(&self, config: &KvConfig) -> Result<(Client, ConnectionManager)>;
}

pub struct DefaultRedisProvider;

/// 单机模式的连接地址
///
/// 开启TLS时使用 `rediss://`；配置了独立密码且地址中没有凭据时补上密码
pub(crate) fn standalone_url(config: &KvConfig) -> String {
    let raw = config.connection_string.expose_secret().trim();
    let mut url = if config.enable_tls && raw.starts_with("redis://") {
        raw.replacen("redis://", "rediss://", 1)
    } else {
        raw.to_string()
    };
    if let Some(password) = &config.password {
        if let Some(scheme_end) = url.find("://") {
            let authority = &url[scheme_end + 3..];
            let host_end = authority.find('/').unwrap_or(authority.len());
            if !authority[..host_end].contains('@') {
                url.insert_str(scheme_end + 3, &format!(":{}@", password.expose_secret()));
            }
        }
    }
    url
}

/// 哨兵模式的连接地址
///
/// `redis+sentinel://[:password@]host:port[,host:port]/master_name`
pub(crate) fn sentinel_url(config: &KvConfig) -> Result<String> {
    let sentinel = config
        .sentinel
        .as_ref()
        .ok_or_else(|| SyncError::ConfigError("Sentinel configuration is missing".to_string()))?;
    let nodes: Vec<&str> = sentinel
        .nodes
        .iter()
        .map(|n| {
            n.trim()
                .trim_start_matches("redis+sentinel://")
                .trim_start_matches("redis://")
        })
        .filter(|n| !n.is_empty())
        .collect();
    if nodes.is_empty() {
        return Err(SyncError::ConfigError(
            "No sentinel nodes provided".to_string(),
        ));
    }

    let credentials = config
        .password
        .as_ref()
        .map(|p| format!(":{}@", p.expose_secret()))
        .unwrap_or_default();
    Ok(format!(
        "redis+sentinel://{}{}/{}",
        credentials,
        nodes.join(","),
        sentinel.master_name
    ))
}

/// 打开客户端并在连接超时内建立连接管理器
async fn connect(url: &str, connection_timeout_ms: u64) -> Result<(Client, ConnectionManager)> {
    let target = redact_connection_string(url);
    info!("Connecting to Redis at {}", target);
    let client = Client::open(url)?;
    match timeout(
        Duration::from_millis(connection_timeout_ms),
        client.get_connection_manager(),
    )
    .await
    {
        Ok(manager) => Ok((client, manager?)),
        Err(_) => Err(SyncError::KvError(format!(
            "Connection timed out after {}ms. Target: {}",
            connection_timeout_ms, target
        ))),
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn get_standalone_client(&self, config: &KvConfig) -> Result<(Client, ConnectionManager)> {
        connect(&standalone_url(config), config.connection_timeout_ms).await
    }

    async fn get_sentinel_client(&self, config: &KvConfig) -> Result<(Client, ConnectionManager)> {
        // 连接管理器负责重连，主节点切换由哨兵解析
        connect(&sentinel_url(config)?, config.connection_timeout_ms).await
    }
}
