//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! TTL修复任务：为丢失过期时间的事件键补上规范TTL。

use super::common::{KeyFailure, RepairOutcome, RepairReport};
use crate::backend::{scan_keys, KeyTtl, KvStore};
use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::model::{EntityKind, Record};
use crate::serialization::RecordCodec;
use crate::utils::{bounded, now_epoch};
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// 单个键的检查结果
enum KeyState {
    Vanished,
    Healthy,
    Repaired(u64),
}

/// TTL修复任务
///
/// 只设置过期时间，从不删除键
pub struct ExpiryRepairJob {
    kv: Arc<dyn KvStore>,
    codec: RecordCodec,
    scan_count: usize,
    op_timeout: Duration,
    metrics: Arc<SyncMetrics>,
}

impl ExpiryRepairJob {
    pub fn new(
        kv: Arc<dyn KvStore>,
        codec: RecordCodec,
        scan_count: usize,
        op_timeout: Duration,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            kv,
            codec,
            scan_count: scan_count.max(1),
            op_timeout,
            metrics,
        }
    }

    /// 修复所有事件类型
    #[instrument(skip(self))]
    pub async fn repair_all(&self) -> RepairReport {
        let outcomes = join_all(EntityKind::EVENTS.into_iter().map(|kind| self.repair(kind))).await;
        self.metrics.mark_run("repair", now_epoch());
        let report = RepairReport { outcomes };
        info!("Expiry repair finished: {} keys repaired", report.total_repaired());
        report
    }

    /// 修复单个类型
    ///
    /// 用户档案没有TTL策略，返回空结果
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn repair(&self, kind: EntityKind) -> RepairOutcome {
        let mut outcome = RepairOutcome::empty(kind);
        if !kind.is_event_log() {
            return outcome;
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut keys = scan_keys(self.kv.as_ref(), kind.pattern(), self.scan_count);
        while let Some(item) = keys.next().await {
            let key = match item {
                Ok(key) => key,
                Err(e) => {
                    error!("Scan of {} aborted during repair: {}", kind, e);
                    outcome.aborted = Some(e.to_string());
                    break;
                }
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            outcome.scanned += 1;
            match self.check(kind, &key).await {
                Ok(KeyState::Vanished) => outcome.vanished += 1,
                Ok(KeyState::Healthy) => outcome.healthy += 1,
                Ok(KeyState::Repaired(ttl)) => {
                    debug!("Restored ttl {}s on {}", ttl, key);
                    outcome.repaired += 1;
                }
                Err(e) => {
                    warn!("Repair failed for {}: {}", key, e);
                    outcome.failures.push(KeyFailure::new(key, &e));
                }
            }
        }

        self.metrics.add(kind, "repaired", outcome.repaired as u64);
        self.metrics.add(kind, "vanished", outcome.vanished as u64);
        if outcome.repaired > 0 {
            info!("{}: restored ttl on {} keys", kind, outcome.repaired);
        }
        outcome
    }

    async fn check(&self, kind: EntityKind, key: &str) -> Result<KeyState> {
        match bounded(self.op_timeout, "kv ttl", self.kv.ttl(key)).await? {
            KeyTtl::Missing => Ok(KeyState::Vanished),
            KeyTtl::Expiring(_) => Ok(KeyState::Healthy),
            KeyTtl::Persistent => {
                let ttl = match kind.fixed_ttl() {
                    Some(ttl) => ttl,
                    None => match self.claim_ttl(key).await? {
                        Some(ttl) => ttl,
                        None => return Ok(KeyState::Vanished),
                    },
                };
                if bounded(self.op_timeout, "kv expire", self.kv.expire(key, ttl)).await? {
                    Ok(KeyState::Repaired(ttl))
                } else {
                    Ok(KeyState::Vanished)
                }
            }
        }
    }

    /// 领取记录的TTL取决于负载中的领取类型
    async fn claim_ttl(&self, key: &str) -> Result<Option<u64>> {
        let Some(bytes) = bounded(self.op_timeout, "kv get", self.kv.get(key)).await? else {
            return Ok(None);
        };
        match self.codec.decode(EntityKind::Claim, &bytes) {
            Ok(Record::Claim(claim)) => Ok(Some(claim.claim_type.ttl_secs())),
            Ok(other) => Err(SyncError::decode(
                key,
                format!("expected a claim, found {}", other.kind()),
            )),
            Err(e) => Err(SyncError::decode(key, e)),
        }
    }
}
