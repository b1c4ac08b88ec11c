//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步与修复任务的公共结果类型。

use crate::error::{ErrorClass, SyncError};
use crate::model::EntityKind;
use serde::Serialize;
use std::fmt;

/// 同步阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Scanning,
    Draining,
    Committing,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Scanning => "scanning",
            SyncPhase::Draining => "draining",
            SyncPhase::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// 单个键的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    #[serde(skip)]
    pub class: ErrorClass,
    pub reason: String,
}

impl KeyFailure {
    pub fn new(key: impl Into<String>, error: &SyncError) -> Self {
        let reason = match error {
            SyncError::AtKey { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Self {
            key: key.into(),
            class: error.class(),
            reason,
        }
    }
}

/// 单个实体类型一次同步的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub kind: EntityKind,
    /// 扫描到的不重复键数量
    pub scanned: usize,
    /// 成功写入持久层的数量
    pub synced: usize,
    /// 从KV删除的数量（档案始终为0）
    pub deleted: usize,
    pub failures: Vec<KeyFailure>,
    /// 扫描失败，本轮提前结束
    pub aborted: Option<String>,
}

impl BatchOutcome {
    pub fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            scanned: 0,
            synced: 0,
            deleted: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

/// 一次完整同步的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub batches: Vec<BatchOutcome>,
}

impl SyncReport {
    /// 所有类型成功同步的总数
    pub fn total_synced(&self) -> usize {
        self.batches.iter().map(|b| b.synced).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.batches.iter().map(|b| b.failures.len()).sum()
    }

    pub fn batch(&self, kind: EntityKind) -> Option<&BatchOutcome> {
        self.batches.iter().find(|b| b.kind == kind)
    }
}

/// 单个实体类型一次TTL修复的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub kind: EntityKind,
    pub scanned: usize,
    /// 补上TTL的键
    pub repaired: usize,
    /// 扫描后已消失的键
    pub vanished: usize,
    /// 已有TTL的键
    pub healthy: usize,
    pub failures: Vec<KeyFailure>,
    pub aborted: Option<String>,
}

impl RepairOutcome {
    pub fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            scanned: 0,
            repaired: 0,
            vanished: 0,
            healthy: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }
}

/// 一次完整修复的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub outcomes: Vec<RepairOutcome>,
}

impl RepairReport {
    pub fn total_repaired(&self) -> usize {
        self.outcomes.iter().map(|o| o.repaired).sum()
    }

    pub fn outcome(&self, kind: EntityKind) -> Option<&RepairOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}
