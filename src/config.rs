//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步服务的配置结构和解析逻辑。

use crate::error::{Result, SyncError};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 覆盖KV连接字符串的环境变量
pub const REDIS_URL_ENV: &str = "XPSYNC_REDIS_URL";
/// 覆盖持久层连接字符串的环境变量
pub const DATABASE_URL_ENV: &str = "XPSYNC_DATABASE_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub durable: DurableConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub leveling: LevelingConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 服务名称，用于链路追踪
    pub service_name: String,
    /// 默认日志过滤规则，`RUST_LOG` 优先
    pub log_filter: String,
    /// 是否对KV负载启用gzip压缩
    pub compress_payloads: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            service_name: "xpsync".to_string(),
            log_filter: "info".to_string(),
            compress_payloads: false,
        }
    }
}

/// KV存储模式
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KvMode {
    /// 单机Redis
    #[default]
    Standalone,
    /// 哨兵管理的主节点
    Sentinel,
    /// 进程内存储，仅用于开发和测试
    Memory,
}

/// KV存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct KvConfig {
    /// Redis模式
    pub mode: KvMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// Redis 密码（可选）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 哨兵配置
    pub sentinel: Option<SentinelConfig>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            mode: KvMode::Standalone,
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            password: None,
            enable_tls: false,
            sentinel: None,
        }
    }
}

/// 哨兵配置
#[derive(Deserialize, Clone, Debug)]
pub struct SentinelConfig {
    /// 主节点名称
    pub master_name: String,
    /// 哨兵节点列表
    pub nodes: Vec<String>,
}

/// 持久层配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DurableConfig {
    /// 数据库连接字符串（sqlite/postgres/mysql，或 `memory`）
    pub connection_string: SecretString,
    /// 最大连接数
    pub max_connections: u32,
    /// 连接超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 单条语句超时时间（毫秒）
    pub query_timeout_ms: u64,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("sqlite:./data/xpsync.db".to_string().into()),
            max_connections: 10,
            connect_timeout_ms: 10_000,
            query_timeout_ms: 5000,
        }
    }
}

/// 同步与修复任务配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 全量同步间隔（秒）
    pub interval_secs: u64,
    /// TTL修复间隔（秒）
    pub repair_interval_secs: u64,
    /// 每次提交的最大条目数
    pub batch_size: usize,
    /// SCAN COUNT 提示值
    pub scan_count: usize,
    /// 单次存储操作超时（毫秒）
    pub operation_timeout_ms: u64,
    /// 启动后是否立即执行一轮
    pub run_on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            repair_interval_secs: 3600,
            batch_size: 500,
            scan_count: 1000,
            operation_timeout_ms: 5000,
            run_on_start: true,
        }
    }
}

/// 等级与经验规则
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LevelingConfig {
    /// 1级升2级所需经验
    pub initial_threshold: u64,
    /// 每级所需经验增长率
    pub growth_rate: f64,
    /// 每条消息经验
    pub xp_per_message: f64,
    /// 每个表情回应经验
    pub xp_per_reaction: f64,
    /// 每分钟语音经验
    pub xp_per_voice_minute: f64,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 100,
            growth_rate: 0.05,
            xp_per_message: 2.0,
            xp_per_reaction: 0.5,
            xp_per_voice_minute: 0.3,
        }
    }
}

/// 经济系统规则
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct EconomyConfig {
    /// 新用户初始余额
    pub starting_balance: i64,
    /// 每日奖励基数
    pub daily_reward: i64,
    /// 每周奖励基数
    pub weekly_reward: i64,
    /// 等级加成系数
    pub level_multiplier: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_balance: 0,
            daily_reward: 10,
            weekly_reward: 70,
            level_multiplier: 0.1,
        }
    }
}

impl Config {
    /// 从TOML文件加载配置，并应用环境变量覆盖
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        config.validate().map_err(SyncError::ConfigError)?;
        Ok(config)
    }

    /// 解析TOML字符串
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::ConfigError(e.to_string()))
    }

    /// 使用环境变量覆盖连接字符串
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            self.kv.connection_string = SecretString::new(url.into());
        }
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            self.durable.connection_string = SecretString::new(url.into());
        }
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.service_name.is_empty() {
            return Err("Global service_name cannot be empty".to_string());
        }

        // KV
        if self.kv.mode != KvMode::Memory {
            let timeout = self.kv.connection_timeout_ms;
            if !(100..=30000).contains(&timeout) {
                return Err("kv connection_timeout_ms must be between 100 and 30000 ms".to_string());
            }
            let timeout = self.kv.command_timeout_ms;
            if !(100..=60000).contains(&timeout) {
                return Err("kv command_timeout_ms must be between 100 and 60000 ms".to_string());
            }
        }
        if self.kv.mode == KvMode::Sentinel {
            match &self.kv.sentinel {
                None => return Err("kv mode 'sentinel' requires a [kv.sentinel] section".to_string()),
                Some(s) if s.nodes.is_empty() => {
                    return Err("kv sentinel nodes cannot be empty".to_string())
                }
                Some(s) if s.master_name.is_empty() => {
                    return Err("kv sentinel master_name cannot be empty".to_string())
                }
                _ => {}
            }
        }

        // 持久层
        if self.durable.max_connections == 0 {
            return Err("durable max_connections cannot be zero".to_string());
        }
        if !(100..=60000).contains(&self.durable.query_timeout_ms) {
            return Err("durable query_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        // 同步任务
        if self.sync.interval_secs == 0 {
            return Err("sync interval_secs cannot be zero".to_string());
        }
        if self.sync.repair_interval_secs == 0 {
            return Err("sync repair_interval_secs cannot be zero".to_string());
        }
        if self.sync.batch_size == 0 || self.sync.batch_size > 10000 {
            return Err("sync batch_size must be between 1 and 10000".to_string());
        }
        if self.sync.scan_count == 0 {
            return Err("sync scan_count cannot be zero".to_string());
        }
        if !(10..=60000).contains(&self.sync.operation_timeout_ms) {
            return Err("sync operation_timeout_ms must be between 10 and 60000 ms".to_string());
        }

        // 等级曲线
        if self.leveling.initial_threshold == 0 {
            return Err("leveling initial_threshold cannot be zero".to_string());
        }
        if !self.leveling.growth_rate.is_finite() || self.leveling.growth_rate < 0.0 {
            return Err("leveling growth_rate must be a non-negative number".to_string());
        }
        for (name, value) in [
            ("xp_per_message", self.leveling.xp_per_message),
            ("xp_per_reaction", self.leveling.xp_per_reaction),
            ("xp_per_voice_minute", self.leveling.xp_per_voice_minute),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("leveling {} must be a non-negative number", name));
            }
        }

        // 经济
        if self.economy.starting_balance < 0 {
            return Err("economy starting_balance cannot be negative".to_string());
        }
        if self.economy.daily_reward < 0 || self.economy.weekly_reward < 0 {
            return Err("economy rewards cannot be negative".to_string());
        }
        if !self.economy.level_multiplier.is_finite() || self.economy.level_multiplier < 0.0 {
            return Err("economy level_multiplier must be a non-negative number".to_string());
        }

        Ok(())
    }
}
