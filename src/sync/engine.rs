//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 同步引擎：按键模式批量排空KV，写入持久层。
//!
//! 用户档案按身份upsert且保留在KV中；事件日志逐条insert，
//! 成功后批量从KV删除。删除失败时下一轮会重复insert（至少一次）。

use super::common::{BatchOutcome, KeyFailure, SyncPhase, SyncReport};
use crate::backend::KvStore;
use crate::cache::{EventLogBuffer, ScannedEntry};
use crate::database::{DurableStore, Filter};
use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::model::{EntityKey, EntityKind, Record};
use crate::serialization::RecordCodec;
use crate::utils::{bounded, now_epoch, KeyedLock};
use dashmap::DashMap;
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// 阶段守卫，离开作用域时恢复为 Idle
struct PhaseGuard<'a> {
    phases: &'a DashMap<EntityKind, SyncPhase>,
    kind: EntityKind,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phases: &'a DashMap<EntityKind, SyncPhase>, kind: EntityKind) -> Self {
        phases.insert(kind, SyncPhase::Scanning);
        Self { phases, kind }
    }

    fn set(&self, phase: SyncPhase) {
        self.phases.insert(self.kind, phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phases.insert(self.kind, SyncPhase::Idle);
    }
}

/// 同步引擎
pub struct SyncEngine {
    kv: Arc<dyn KvStore>,
    durable: Arc<dyn DurableStore>,
    buffer: Arc<EventLogBuffer>,
    codec: RecordCodec,
    batch_size: usize,
    op_timeout: Duration,
    phases: DashMap<EntityKind, SyncPhase>,
    /// 同一类型的同步互斥，定时与手动触发不会交叠
    running: KeyedLock<EntityKind>,
    metrics: Arc<SyncMetrics>,
}

impl SyncEngine {
    pub fn new(
        kv: Arc<dyn KvStore>,
        durable: Arc<dyn DurableStore>,
        buffer: Arc<EventLogBuffer>,
        codec: RecordCodec,
        batch_size: usize,
        op_timeout: Duration,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            kv,
            durable,
            buffer,
            codec,
            batch_size: batch_size.max(1),
            op_timeout,
            phases: DashMap::new(),
            running: KeyedLock::new(),
            metrics,
        }
    }

    /// 当前阶段
    pub fn phase(&self, kind: EntityKind) -> SyncPhase {
        self.phases.get(&kind).map(|p| *p).unwrap_or_default()
    }

    /// 所有类型的当前阶段
    pub fn phases(&self) -> Vec<(EntityKind, SyncPhase)> {
        EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, self.phase(kind)))
            .collect()
    }

    /// 并发同步所有类型，各类型互不影响
    #[instrument(skip(self), fields(pass = %uuid::Uuid::new_v4()))]
    pub async fn sync_all(&self) -> SyncReport {
        let batches = join_all(EntityKind::ALL.into_iter().map(|kind| self.sync_kind(kind))).await;
        self.metrics.mark_run("sync", now_epoch());
        let report = SyncReport { batches };
        info!(
            "Sync pass finished: {} synced, {} failures",
            report.total_synced(),
            report.total_failures()
        );
        report
    }

    /// 同步单个类型
    ///
    /// 单个键的失败记录在结果中，不会中断本轮；扫描失败时以 `aborted` 结束
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn sync_kind(&self, kind: EntityKind) -> BatchOutcome {
        let _running = self.running.lock(kind).await;
        let phase = PhaseGuard::enter(&self.phases, kind);
        let mut outcome = BatchOutcome::empty(kind);
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<ScannedEntry> = Vec::with_capacity(self.batch_size);

        let mut entries = self.buffer.scan(kind);
        while let Some(item) = entries.next().await {
            match item {
                Ok(entry) => {
                    if !seen.insert(entry.key.clone()) {
                        continue;
                    }
                    outcome.scanned += 1;
                    pending.push(entry);
                    if pending.len() >= self.batch_size {
                        self.process_chunk(kind, &phase, std::mem::take(&mut pending), &mut outcome)
                            .await;
                        phase.set(SyncPhase::Scanning);
                    }
                }
                Err(e) => match e.key().map(str::to_string) {
                    Some(key) => {
                        if seen.insert(key.clone()) {
                            outcome.scanned += 1;
                            outcome.failures.push(KeyFailure::new(key, &e));
                        }
                    }
                    None => {
                        error!("Scan of {} aborted: {}", kind, e);
                        outcome.aborted = Some(e.to_string());
                        break;
                    }
                },
            }
        }
        drop(entries);

        if !pending.is_empty() {
            self.process_chunk(kind, &phase, pending, &mut outcome).await;
        }

        self.record_metrics(&outcome);
        if outcome.scanned > 0 {
            debug!(
                "{}: scanned {}, synced {}, deleted {}, failed {}",
                kind,
                outcome.scanned,
                outcome.synced,
                outcome.deleted,
                outcome.failures.len()
            );
        }
        outcome
    }

    async fn process_chunk(
        &self,
        kind: EntityKind,
        phase: &PhaseGuard<'_>,
        chunk: Vec<ScannedEntry>,
        outcome: &mut BatchOutcome,
    ) {
        phase.set(SyncPhase::Draining);
        let mut drained: Vec<(EntityKey, Record)> = Vec::with_capacity(chunk.len());
        for entry in &chunk {
            match self.buffer.decode(entry) {
                Ok(decoded) => drained.push(decoded),
                Err(e) => {
                    warn!("Skipping undecodable entry {}: {}", entry.key, e);
                    outcome.failures.push(KeyFailure::new(entry.key.clone(), &e));
                }
            }
        }

        phase.set(SyncPhase::Committing);
        if kind.is_event_log() {
            self.commit_events(kind, drained, outcome).await;
        } else {
            self.commit_profiles(drained, outcome).await;
        }
    }

    async fn commit_profiles(&self, drained: Vec<(EntityKey, Record)>, outcome: &mut BatchOutcome) {
        for (key, record) in drained {
            let raw = key.encode();
            match self.upsert_profile(&record).await {
                Ok(()) => outcome.synced += 1,
                Err(e) => {
                    warn!("Profile upsert failed for {}: {}", raw, e);
                    outcome.failures.push(KeyFailure::new(raw, &e));
                }
            }
        }
    }

    async fn upsert_profile(&self, record: &Record) -> Result<()> {
        let filter = Filter::eq("user_id", record.user_id());
        let document = self.codec.to_document(record)?;
        bounded(
            self.op_timeout,
            "durable upsert",
            self.durable
                .upsert(EntityKind::User.collection(), &filter, document),
        )
        .await
    }

    async fn commit_events(
        &self,
        kind: EntityKind,
        drained: Vec<(EntityKey, Record)>,
        outcome: &mut BatchOutcome,
    ) {
        let mut committed: Vec<String> = Vec::with_capacity(drained.len());
        for (key, record) in drained {
            let raw = key.encode();
            match self.insert_event(kind, &record).await {
                Ok(()) => {
                    outcome.synced += 1;
                    committed.push(raw);
                }
                Err(e) => {
                    warn!("Insert failed for {}: {}", raw, e);
                    outcome.failures.push(KeyFailure::new(raw, &e));
                }
            }
        }
        if committed.is_empty() {
            return;
        }
        match bounded(self.op_timeout, "kv delete", self.kv.delete(&committed)).await {
            Ok(removed) => outcome.deleted += removed,
            Err(e) => {
                // 键保留在KV中，下一轮会再次写入
                error!(
                    "Failed to delete {} synced {} keys: {}",
                    committed.len(),
                    kind,
                    e
                );
            }
        }
    }

    async fn insert_event(&self, kind: EntityKind, record: &Record) -> Result<()> {
        if record.kind() != kind {
            return Err(SyncError::Validation(format!(
                "{} record found under {} keys",
                record.kind(),
                kind
            )));
        }
        let document = self.codec.to_document(record)?;
        bounded(
            self.op_timeout,
            "durable insert",
            self.durable.insert(kind.collection(), document),
        )
        .await
    }

    fn record_metrics(&self, outcome: &BatchOutcome) {
        let kind = outcome.kind;
        self.metrics.add(kind, "passes", 1);
        self.metrics.add(kind, "synced", outcome.synced as u64);
        self.metrics.add(kind, "deleted", outcome.deleted as u64);
        self.metrics.add(kind, "failed", outcome.failures.len() as u64);
    }
}
