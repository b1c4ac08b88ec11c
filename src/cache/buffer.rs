//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 事件日志缓冲区：带TTL的事件条目在KV中暂存，等待同步引擎落盘。

use crate::backend::{scan_keys, KvStore};
use crate::error::{Result, SyncError};
use crate::model::{EntityKey, EntityKind, Record};
use crate::serialization::RecordCodec;
use crate::utils::bounded;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// 扫描得到的条目
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedEntry {
    pub key: String,
    pub payload: Vec<u8>,
}

/// 事件日志缓冲区
pub struct EventLogBuffer {
    kv: Arc<dyn KvStore>,
    codec: RecordCodec,
    scan_count: usize,
    op_timeout: Duration,
}

impl EventLogBuffer {
    pub fn new(
        kv: Arc<dyn KvStore>,
        codec: RecordCodec,
        scan_count: usize,
        op_timeout: Duration,
    ) -> Self {
        Self {
            kv,
            codec,
            scan_count: scan_count.max(1),
            op_timeout,
        }
    }

    /// 写入事件，键与TTL由记录推导
    ///
    /// # 返回值
    ///
    /// 写入的键；用户档案不属于事件日志，会被拒绝
    #[instrument(skip(self, record), level = "debug", fields(kind = %record.kind()))]
    pub async fn record(&self, record: &Record) -> Result<EntityKey> {
        let kind = record.kind();
        if !kind.is_event_log() {
            return Err(SyncError::Validation(format!(
                "{} records are not event log entries",
                kind
            )));
        }
        let key = record.key()?;
        let ttl = record.ttl_secs();
        let bytes = self.codec.encode(record)?;
        let raw = key.encode();
        bounded(self.op_timeout, "kv set", self.kv.set(&raw, bytes, ttl)).await?;
        debug!("Buffered {} with ttl {:?}", raw, ttl);
        Ok(key)
    }

    /// 查找事件
    #[instrument(skip(self), level = "debug")]
    pub async fn lookup(&self, key: &EntityKey) -> Result<Option<Record>> {
        let raw = key.encode();
        match bounded(self.op_timeout, "kv get", self.kv.get(&raw)).await? {
            Some(bytes) => self.codec.decode_entry(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// 删除事件，返回是否实际删除
    #[instrument(skip(self), level = "debug")]
    pub async fn remove(&self, key: &EntityKey) -> Result<bool> {
        let keys = vec![key.encode()];
        let removed = bounded(self.op_timeout, "kv delete", self.kv.delete(&keys)).await?;
        Ok(removed > 0)
    }

    /// 惰性扫描某类型的全部条目
    ///
    /// 单次遍历，无快照隔离；扫描与读取之间消失的键被跳过；
    /// 单个键读取失败以 `SyncError::AtKey` 产出，不影响后续条目
    pub fn scan(&self, kind: EntityKind) -> BoxStream<'_, Result<ScannedEntry>> {
        self.scan_pattern(kind.pattern())
    }

    /// 按前导键部分缩小扫描范围，例如某用户的每日领取记录
    pub fn scan_matching(
        &self,
        kind: EntityKind,
        leading: &[String],
    ) -> Result<BoxStream<'_, Result<ScannedEntry>>> {
        let pattern = EntityKey::prefix_pattern(kind, leading)?;
        Ok(self.scan_pattern(pattern))
    }

    fn scan_pattern(&self, pattern: String) -> BoxStream<'_, Result<ScannedEntry>> {
        let kv = self.kv.as_ref();
        let limit = self.op_timeout;
        scan_keys(kv, pattern, self.scan_count)
            .and_then(move |key| async move {
                match bounded(limit, "kv get", kv.get(&key)).await {
                    Ok(payload) => Ok(payload.map(|payload| ScannedEntry { key, payload })),
                    Err(e) => Err(SyncError::at_key(key, e)),
                }
            })
            .try_filter_map(|entry| async move { Ok(entry) })
            .boxed()
    }

    /// 解码扫描得到的条目，键中的身份字段合并进记录
    pub fn decode(&self, entry: &ScannedEntry) -> Result<(EntityKey, Record)> {
        let key = EntityKey::parse(&entry.key)
            .map_err(|e| SyncError::decode(entry.key.clone(), e))?;
        let record = self.codec.decode_entry(&key, &entry.payload)?;
        Ok((key, record))
    }
}
