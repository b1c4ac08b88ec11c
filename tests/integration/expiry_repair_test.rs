//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! TTL修复集成测试：通过门面触发清理，验证各类事件键的过期时间恢复

#[path = "../common/mod.rs"]
mod common;

use common::{cache_with, memory_cache, memory_config, FlakyDurableStore, FlakyKvStore};
use std::sync::Arc;
use xpsync::backend::{KeyTtl, KvStore};
use xpsync::model::EntityKind;

fn persistent_claim(claim_type: &str, user_id: u64, claim_time: i64) -> Vec<u8> {
    format!(
        r#"{{"user_id":{},"claim_type":"{}","claim_time":{},"amount":10}}"#,
        user_id, claim_type, claim_time
    )
    .into_bytes()
}

/// 丢失TTL的键按类型恢复规范过期时间
#[tokio::test]
async fn test_cleanup_restores_canonical_ttls() {
    let (kv, _, cache) = memory_cache();

    kv.set("message:10", br#"{"user_id":1,"xp_value":2.0,"timestamp":1}"#.to_vec(), None)
        .await
        .unwrap();
    kv.set(
        "reaction:10:1:x",
        br#"{"user_id":1,"xp_value":0.5,"timestamp":1}"#.to_vec(),
        None,
    )
    .await
    .unwrap();
    kv.set("claim:daily:1:500", persistent_claim("daily", 1, 500), None)
        .await
        .unwrap();
    kv.set("claim:weekly:1:500", persistent_claim("weekly", 1, 500), None)
        .await
        .unwrap();

    let report = cache.trigger_cleanup().await;
    assert_eq!(report.total_repaired(), 4);
    assert_eq!(report.outcome(EntityKind::Message).unwrap().repaired, 1);
    assert_eq!(report.outcome(EntityKind::Claim).unwrap().repaired, 2);

    assert_eq!(kv.ttl("message:10").await.unwrap(), KeyTtl::Expiring(604_800));
    assert_eq!(
        kv.ttl("reaction:10:1:x").await.unwrap(),
        KeyTtl::Expiring(2_592_000)
    );
    assert_eq!(
        kv.ttl("claim:daily:1:500").await.unwrap(),
        KeyTtl::Expiring(90_000)
    );
    assert_eq!(
        kv.ttl("claim:weekly:1:500").await.unwrap(),
        KeyTtl::Expiring(691_200)
    );
    assert!(cache.metrics().last_run("repair").is_some());
    assert_eq!(cache.metrics().get(EntityKind::Claim, "repaired"), 2);
}

/// 已有TTL的键和用户档案保持不变
#[tokio::test]
async fn test_cleanup_leaves_healthy_keys_and_profiles() {
    let (kv, _, cache) = memory_cache();
    cache.on_user_activity(8, 5.0).await.unwrap();
    kv.set("voice:8:100", br#"{"user_id":8}"#.to_vec(), Some(120))
        .await
        .unwrap();

    let report = cache.trigger_cleanup().await;
    assert_eq!(report.total_repaired(), 0);
    assert_eq!(report.outcome(EntityKind::Voice).unwrap().healthy, 1);
    assert!(report.outcome(EntityKind::User).is_none());

    assert_eq!(kv.ttl("voice:8:100").await.unwrap(), KeyTtl::Expiring(120));
    assert_eq!(kv.ttl("user:8").await.unwrap(), KeyTtl::Persistent);
}

/// 通过缓冲区写入的事件自带TTL，清理无事可做
#[tokio::test]
async fn test_buffered_events_already_expire() {
    let (_, _, cache) = memory_cache();
    cache.activity().on_message(3, 900, 1_000).await.unwrap();
    cache.economy().add_item("badge", 1, None, 1_000).await.unwrap();
    cache
        .economy()
        .purchase(3, "badge", 1_001)
        .await
        .unwrap_err();

    let report = cache.trigger_cleanup().await;
    assert_eq!(report.total_repaired(), 0);
    assert_eq!(report.outcome(EntityKind::Message).unwrap().healthy, 1);
}

/// 损坏的领取负载记为失败，不影响其他键
#[tokio::test]
async fn test_undecodable_claim_is_reported() {
    let (kv, _, cache) = memory_cache();
    kv.set("claim:daily:2:10", b"garbage".to_vec(), None)
        .await
        .unwrap();
    kv.set("claim:daily:3:10", persistent_claim("daily", 3, 10), None)
        .await
        .unwrap();

    let report = cache.trigger_cleanup().await;
    let claims = report.outcome(EntityKind::Claim).unwrap();
    assert_eq!(claims.repaired, 1);
    assert_eq!(claims.failures.len(), 1);
    assert_eq!(claims.failures[0].key, "claim:daily:2:10");
    assert_eq!(kv.ttl("claim:daily:2:10").await.unwrap(), KeyTtl::Persistent);
}

/// 扫描失败只中止该类型
#[tokio::test]
async fn test_scan_failure_aborts_one_kind() {
    let kv = Arc::new(FlakyKvStore::new());
    kv.fail_scan("purchase:*");
    let cache = cache_with(memory_config(), kv.clone(), Arc::new(FlakyDurableStore::new()));
    kv.inner
        .set("message:1", br#"{"user_id":1}"#.to_vec(), None)
        .await
        .unwrap();

    let report = cache.trigger_cleanup().await;
    assert!(report.outcome(EntityKind::Purchase).unwrap().aborted.is_some());
    assert_eq!(report.outcome(EntityKind::Message).unwrap().repaired, 1);
}
