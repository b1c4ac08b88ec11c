//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 同步引擎集成测试：批量排空、幂等upsert、按键隔离与至少一次语义

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::{
    cache_with, generate_unique_user_id, memory_cache, memory_config, FlakyDurableStore,
    FlakyKvStore,
};
use mockall::mock;
use mockall::predicate::eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use xpsync::backend::{KvStore, MemoryKvStore};
use xpsync::database::{DurableStore, Filter};
use xpsync::error::{ErrorClass, Result};
use xpsync::model::{EntityKind, MessageEvent, ReactionEvent, Record};
use xpsync::serialization::Document;
use xpsync::SyncPhase;

mock! {
    pub Durable {}

    #[async_trait]
    impl DurableStore for Durable {
        async fn insert(&self, collection: &str, document: Document) -> Result<()>;
        async fn upsert(&self, collection: &str, filter: &Filter, document: Document) -> Result<()>;
        async fn find(
            &self,
            collection: &str,
            filter: &Filter,
            limit: Option<u64>,
        ) -> Result<Vec<Document>>;
        async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;
        async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64>;
        async fn ping(&self) -> Result<()>;
    }
}

fn message(message_id: u64, user_id: u64) -> Record {
    Record::Message(MessageEvent {
        message_id,
        user_id,
        xp_value: 2.0,
        timestamp: 1_700_000_000,
    })
}

fn reaction(message_id: u64, user_id: u64, emoji: &str) -> Record {
    Record::Reaction(ReactionEvent {
        message_id,
        user_id,
        emoji: emoji.to_string(),
        xp_value: 0.5,
        timestamp: 1_700_000_000,
    })
}

/// 事件日志全部落盘并从KV删除，档案保留在KV中
#[tokio::test]
async fn test_sync_drains_events_and_keeps_profiles() {
    let (kv, durable, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    cache.on_user_activity(user_id, 10.0).await.unwrap();
    for id in 0..10 {
        cache.on_transient_event(&message(id, user_id)).await.unwrap();
    }
    cache
        .on_transient_event(&reaction(3, user_id, "🔥"))
        .await
        .unwrap();

    let report = cache.trigger_sync().await;
    assert_eq!(report.total_synced(), 12);
    assert_eq!(report.total_failures(), 0);

    let messages = report.batch(EntityKind::Message).unwrap();
    assert_eq!(messages.scanned, 10);
    assert_eq!(messages.deleted, 10);
    assert_eq!(report.batch(EntityKind::User).unwrap().deleted, 0);

    assert_eq!(durable.count("message_events").await, 10);
    assert_eq!(durable.count("reaction_events").await, 1);
    assert_eq!(durable.count("user_profiles").await, 1);
    assert_eq!(kv.len(), 1);
    assert!(kv.get(&format!("user:{}", user_id)).await.unwrap().is_some());

    assert_eq!(cache.metrics().get(EntityKind::Message, "synced"), 10);
    assert!(cache.metrics().last_run("sync").is_some());
    assert!(cache
        .sync_phases()
        .iter()
        .all(|(_, phase)| *phase == SyncPhase::Idle));
}

/// 批次小于扫描页、扫描页小于键总数时，一轮同步仍然排空所有事件
#[tokio::test]
async fn test_one_pass_drains_across_scan_pages() {
    let mut config = memory_config();
    config.sync.batch_size = 2;
    config.sync.scan_count = 3;
    let kv = Arc::new(MemoryKvStore::new());
    let durable = Arc::new(FlakyDurableStore::new());
    let cache = cache_with(config, kv.clone(), durable.clone());
    let user_id = generate_unique_user_id();

    for message_id in 0..9 {
        cache
            .on_transient_event(&message(message_id, user_id))
            .await
            .unwrap();
    }

    let report = cache.trigger_sync().await;
    let messages = report.batch(EntityKind::Message).unwrap();
    assert_eq!(messages.scanned, 9);
    assert_eq!(messages.synced, 9);
    assert_eq!(messages.deleted, 9);
    assert!(kv.is_empty());
    assert_eq!(durable.inserts.load(Ordering::SeqCst), 9);
}

/// 档案多次同步不会产生重复文档
#[tokio::test]
async fn test_profile_upsert_never_duplicates() {
    let (_, durable, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    for round in 1..=3 {
        cache.on_user_activity(user_id, 50.0).await.unwrap();
        cache.trigger_sync().await;
        let doc = durable
            .find_one("user_profiles", &Filter::eq("user_id", user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["xp"], 50.0 * round as f64);
    }
    assert_eq!(durable.count("user_profiles").await, 1);
}

/// 一个键写入失败不影响其他键，失败的键留到下一轮
#[tokio::test]
async fn test_failing_key_does_not_block_batch() {
    let kv = Arc::new(MemoryKvStore::new());
    let durable = Arc::new(FlakyDurableStore::new());
    durable.fail_document("message_id", 2);
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());

    for id in 0..6 {
        cache.on_transient_event(&message(id, 1)).await.unwrap();
    }
    let report = cache.trigger_sync().await;
    let batch = report.batch(EntityKind::Message).unwrap();
    assert_eq!(batch.synced, 5);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].key, "message:2");
    assert_eq!(batch.failures[0].class, ErrorClass::Transient);
    assert!(kv.get("message:2").await.unwrap().is_some());

    durable.failing_documents.lock().unwrap().clear();
    let report = cache.trigger_sync().await;
    assert_eq!(report.batch(EntityKind::Message).unwrap().synced, 1);
    assert!(kv.is_empty());
}

/// 删除失败时键保留，下一轮重复写入（至少一次）
#[tokio::test]
async fn test_failed_delete_leads_to_reinsert() {
    let kv = Arc::new(FlakyKvStore::new());
    kv.fail_delete.store(true, Ordering::SeqCst);
    let durable = Arc::new(FlakyDurableStore::new());
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());

    for id in 0..3 {
        cache.on_transient_event(&message(id, 1)).await.unwrap();
    }
    let report = cache.trigger_sync().await;
    let batch = report.batch(EntityKind::Message).unwrap();
    assert_eq!(batch.synced, 3);
    assert_eq!(batch.deleted, 0);
    assert_eq!(kv.inner.len(), 3);

    kv.fail_delete.store(false, Ordering::SeqCst);
    let report = cache.trigger_sync().await;
    assert_eq!(report.batch(EntityKind::Message).unwrap().deleted, 3);
    assert!(kv.inner.is_empty());
    assert_eq!(durable.inner.count("message_events").await, 6);
}

/// 扫描返回的重复键在同一轮只处理一次
#[tokio::test]
async fn test_duplicate_scan_keys_processed_once() {
    let kv = Arc::new(FlakyKvStore::new());
    kv.duplicate_scan.store(true, Ordering::SeqCst);
    let durable = Arc::new(FlakyDurableStore::new());
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());

    for id in 0..5 {
        cache.on_transient_event(&message(id, 1)).await.unwrap();
    }
    let report = cache.trigger_sync().await;
    let batch = report.batch(EntityKind::Message).unwrap();
    assert_eq!(batch.scanned, 5);
    assert_eq!(batch.synced, 5);
    assert_eq!(durable.inserts.load(Ordering::SeqCst), 5);
}

/// 单个键读取失败作为该键的失败记录
#[tokio::test]
async fn test_unreadable_key_is_isolated() {
    let kv = Arc::new(FlakyKvStore::new());
    let durable = Arc::new(FlakyDurableStore::new());
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());

    for id in 0..3 {
        cache.on_transient_event(&message(id, 1)).await.unwrap();
    }
    kv.fail_get("message:1");
    let report = cache.trigger_sync().await;
    let batch = report.batch(EntityKind::Message).unwrap();
    assert_eq!(batch.synced, 2);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].key, "message:1");
    assert!(batch.aborted.is_none());
}

/// 损坏的负载被跳过并保留在KV中
#[tokio::test]
async fn test_undecodable_payload_is_skipped() {
    let (kv, durable, cache) = memory_cache();
    cache.on_transient_event(&message(1, 1)).await.unwrap();
    kv.set("message:2", b"not-json".to_vec(), Some(600))
        .await
        .unwrap();

    let report = cache.trigger_sync().await;
    let batch = report.batch(EntityKind::Message).unwrap();
    assert_eq!(batch.synced, 1);
    assert_eq!(batch.failures[0].class, ErrorClass::Decode);
    assert_eq!(durable.count("message_events").await, 1);
    assert!(kv.get("message:2").await.unwrap().is_some());
}

/// 一个类型扫描失败或写入失败不影响其他类型
#[tokio::test]
async fn test_kinds_are_isolated() {
    let kv = Arc::new(FlakyKvStore::new());
    kv.fail_scan("voice:*");
    let durable = Arc::new(FlakyDurableStore::new());
    durable.fail_collection("reaction_events");
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());

    cache.on_transient_event(&message(1, 1)).await.unwrap();
    cache.on_transient_event(&reaction(1, 2, "x")).await.unwrap();

    let report = cache.trigger_sync().await;
    assert!(report.batch(EntityKind::Voice).unwrap().aborted.is_some());
    assert_eq!(report.batch(EntityKind::Reaction).unwrap().failures.len(), 1);
    assert_eq!(report.batch(EntityKind::Message).unwrap().synced, 1);
    assert_eq!(report.total_synced(), 1);
}

/// 超时的读取记为暂时性失败
#[tokio::test]
async fn test_slow_reads_time_out_per_key() {
    let kv = Arc::new(FlakyKvStore::new());
    let durable = Arc::new(FlakyDurableStore::new());
    let mut config = memory_config();
    config.sync.operation_timeout_ms = 50;
    let cache = cache_with(config, kv.clone(), durable.clone());

    cache.on_transient_event(&message(1, 1)).await.unwrap();
    kv.set_get_delay(Duration::from_millis(300));

    let report = cache.trigger_sync().await;
    let batch = report.batch(EntityKind::Message).unwrap();
    assert_eq!(batch.synced, 0);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].class, ErrorClass::Transient);
    assert_eq!(kv.inner.len(), 1);
}

/// 持久层只收到事件插入，不会对事件做upsert
#[tokio::test]
async fn test_events_use_insert_only() {
    let mut durable = MockDurable::new();
    durable
        .expect_insert()
        .with(eq("message_events"), mockall::predicate::always())
        .times(2)
        .returning(|_, _| Ok(()));
    durable.expect_upsert().never();

    let kv = Arc::new(MemoryKvStore::new());
    let cache = cache_with(memory_config(), kv.clone(), Arc::new(durable));
    cache.on_transient_event(&message(7, 1)).await.unwrap();
    cache.on_transient_event(&message(8, 1)).await.unwrap();

    let report = cache.trigger_sync().await;
    assert_eq!(report.total_synced(), 2);
    assert!(kv.is_empty());
}
