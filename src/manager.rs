//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存门面，负责组装存储、仓库、同步引擎与后台任务。

use crate::activity::{ActivityRules, Reversal};
use crate::backend::{KvStore, MemoryKvStore, RedisKvStore};
use crate::cache::{EventLogBuffer, ProfileRepository, XpOutcome};
use crate::config::{Config, KvMode};
use crate::database::{open_durable_store, DurableStore};
use crate::economy::Economy;
use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::model::{EntityKey, EntityKind, LevelCurve, LevelProgress, Record, UserProfile};
use crate::serialization::RecordCodec;
use crate::sync::{spawn_periodic, ExpiryRepairJob, RepairReport, SyncEngine, SyncPhase, SyncReport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 展示用的档案视图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub profile: UserProfile,
    pub progress: LevelProgress,
}

/// 存储健康状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub kv: std::result::Result<(), String>,
    pub durable: std::result::Result<(), String>,
}

impl StoreHealth {
    pub fn is_healthy(&self) -> bool {
        self.kv.is_ok() && self.durable.is_ok()
    }
}

/// 参与度缓存门面
///
/// 生产方通过它写入档案和事件，读取方通过它获取展示数据；
/// 同步与TTL修复既可以定时执行，也可以手动触发
pub struct EngagementCache {
    config: Config,
    kv: Arc<dyn KvStore>,
    durable: Arc<dyn DurableStore>,
    repository: Arc<ProfileRepository>,
    buffer: Arc<EventLogBuffer>,
    engine: Arc<SyncEngine>,
    repair: Arc<ExpiryRepairJob>,
    activity: ActivityRules,
    economy: Economy,
    metrics: Arc<SyncMetrics>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EngagementCache {
    /// 根据配置连接存储并组装
    #[instrument(skip(config), level = "info", fields(service = %config.global.service_name))]
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate().map_err(SyncError::ConfigError)?;
        let kv: Arc<dyn KvStore> = match config.kv.mode {
            KvMode::Memory => {
                warn!("Using in-process KV store, cached state is not shared or persisted");
                Arc::new(MemoryKvStore::new())
            }
            KvMode::Standalone | KvMode::Sentinel => Arc::new(RedisKvStore::new(&config.kv).await?),
        };
        let durable = open_durable_store(&config.durable).await?;
        Self::with_stores(config, kv, durable)
    }

    /// 使用注入的存储组装
    pub fn with_stores(
        config: Config,
        kv: Arc<dyn KvStore>,
        durable: Arc<dyn DurableStore>,
    ) -> Result<Self> {
        config.validate().map_err(SyncError::ConfigError)?;

        let codec = RecordCodec::from_flag(config.global.compress_payloads);
        let op_timeout = Duration::from_millis(config.sync.operation_timeout_ms);
        let curve = LevelCurve::from_config(&config.leveling);
        let metrics = Arc::new(SyncMetrics::new());

        let repository = Arc::new(ProfileRepository::new(
            kv.clone(),
            durable.clone(),
            codec.clone(),
            curve,
            config.economy.starting_balance,
            op_timeout,
        ));
        let buffer = Arc::new(EventLogBuffer::new(
            kv.clone(),
            codec.clone(),
            config.sync.scan_count,
            op_timeout,
        ));
        let engine = Arc::new(SyncEngine::new(
            kv.clone(),
            durable.clone(),
            buffer.clone(),
            codec.clone(),
            config.sync.batch_size,
            op_timeout,
            metrics.clone(),
        ));
        let repair = Arc::new(ExpiryRepairJob::new(
            kv.clone(),
            codec.clone(),
            config.sync.scan_count,
            op_timeout,
            metrics.clone(),
        ));
        let activity = ActivityRules::new(repository.clone(), buffer.clone(), &config.leveling);
        let economy = Economy::new(
            repository.clone(),
            buffer.clone(),
            durable.clone(),
            codec,
            config.economy.clone(),
            op_timeout,
        );

        Ok(Self {
            config,
            kv,
            durable,
            repository,
            buffer,
            engine,
            repair,
            activity,
            economy,
            metrics,
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &ProfileRepository {
        &self.repository
    }

    pub fn buffer(&self) -> &EventLogBuffer {
        &self.buffer
    }

    pub fn activity(&self) -> &ActivityRules {
        &self.activity
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub async fn on_user_activity(&self, user_id: u64, xp_delta: f64) -> Result<XpOutcome> {
        self.repository.apply_xp_delta(user_id, xp_delta).await
    }

    pub async fn on_activity_reversed(&self, user_id: u64, xp_delta: f64) -> Result<XpOutcome> {
        self.repository.apply_xp_delta(user_id, -xp_delta).await
    }

    pub async fn on_grant_or_spend(
        &self,
        user_id: u64,
        balance_delta: i64,
        floor_at_zero: bool,
    ) -> Result<i64> {
        self.repository
            .apply_balance_delta(user_id, balance_delta, floor_at_zero)
            .await
    }

    pub async fn on_transient_event(&self, record: &Record) -> Result<EntityKey> {
        self.buffer.record(record).await
    }

    /// 撤销仍在缓冲区中的事件
    pub async fn on_event_reversed(
        &self,
        kind: EntityKind,
        key_parts: Vec<String>,
    ) -> Result<Option<Reversal>> {
        let key = EntityKey::new(kind, key_parts)?;
        self.activity.reverse(&key).await
    }

    /// 读取档案及等级进度
    pub async fn get_profile_for_display(&self, user_id: u64) -> Result<Option<ProfileView>> {
        let curve = *self.repository.curve();
        Ok(self
            .repository
            .get_profile(user_id)
            .await?
            .map(|profile| ProfileView {
                progress: curve.progress(profile.xp),
                profile,
            }))
    }

    /// 立即执行一次完整同步
    pub async fn trigger_sync(&self) -> SyncReport {
        self.engine.sync_all().await
    }

    /// 立即执行一次TTL修复
    pub async fn trigger_cleanup(&self) -> RepairReport {
        self.repair.repair_all().await
    }

    pub fn sync_phases(&self) -> Vec<(EntityKind, SyncPhase)> {
        self.engine.phases()
    }

    /// 检查两个存储的连通性
    pub async fn health(&self) -> StoreHealth {
        let (kv, durable) = tokio::join!(self.kv.ping(), self.durable.ping());
        StoreHealth {
            kv: kv.map_err(|e| e.to_string()),
            durable: durable.map_err(|e| e.to_string()),
        }
    }

    /// 启动定时同步和TTL修复，重复调用不会重复启动
    #[instrument(skip(self), level = "info")]
    pub async fn start_background(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(SyncError::ShutdownError(
                "cache has already been shut down".to_string(),
            ));
        }
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return Ok(());
        }

        let engine = self.engine.clone();
        tasks.push(spawn_periodic(
            "sync",
            Duration::from_secs(self.config.sync.interval_secs),
            self.config.sync.run_on_start,
            self.token.child_token(),
            move || {
                let engine = engine.clone();
                async move {
                    engine.sync_all().await;
                }
            },
        ));

        let repair = self.repair.clone();
        tasks.push(spawn_periodic(
            "repair",
            Duration::from_secs(self.config.sync.repair_interval_secs),
            self.config.sync.run_on_start,
            self.token.child_token(),
            move || {
                let repair = repair.clone();
                async move {
                    repair.repair_all().await;
                }
            },
        ));
        info!("Background sync and repair tasks started");
        Ok(())
    }

    /// 停止后台任务，等待进行中的周期结束
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        self.token.cancel();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let mut errors = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            info!("Engagement cache shut down");
            Ok(())
        } else {
            Err(SyncError::ShutdownError(format!(
                "background tasks failed: {}",
                errors.join(", ")
            )))
        }
    }
}
