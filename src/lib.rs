//! xpsync - Redis写穿缓存与持久层同步引擎
//!
//! 为参与度激励场景（经验、等级、货币、购买）提供低延迟的KV缓存，
//! 并按批次将档案与事件日志最终一致地同步到持久化文档存储，
//! 支持TTL修复、定时与手动同步以及优雅关闭。

#![doc(html_root_url = "https://docs.rs/xpsync/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod activity;
pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod economy;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod serialization;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use activity::{ActivityRules, Reversal, VoiceSessionTracker};
pub use backend::{KeyTtl, KvStore, MemoryKvStore, RedisKvStore};
pub use cache::{EventLogBuffer, ProfileRepository, XpOutcome};
pub use config::Config;
pub use database::{DurableStore, Filter, MemoryDocumentStore, SqlDocumentStore};
pub use economy::{ClaimOutcome, Economy};
pub use error::{ErrorClass, Result, SyncError};
pub use manager::{EngagementCache, ProfileView, StoreHealth};
pub use model::{ClaimType, EntityKey, EntityKind, LevelCurve, MarketItem, Record, UserProfile};
pub use sync::{RepairReport, SyncPhase, SyncReport};

/// xpsync 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
