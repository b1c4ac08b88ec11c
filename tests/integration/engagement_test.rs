//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 参与度门面端到端测试：活跃度、撤销、经济系统与后台任务生命周期

#[path = "../common/mod.rs"]
mod common;

use common::{cache_with, generate_unique_user_id, memory_cache, memory_config};
use std::sync::Arc;
use std::time::Duration;
use xpsync::backend::{KvStore, MemoryKvStore};
use xpsync::database::{DurableStore, Filter, MemoryDocumentStore};
use xpsync::model::{EntityKind, Record};
use xpsync::{ClaimOutcome, ClaimType, SyncError};

const DAY: i64 = 86_400;

/// 消息带来经验，未同步前删除消息会扣回经验
#[tokio::test]
async fn test_message_lifecycle_before_sync() {
    let (kv, durable, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    cache.activity().on_message(user_id, 1, 100).await.unwrap();
    cache.activity().on_message(user_id, 2, 101).await.unwrap();
    let profile = cache.repository().get_profile(user_id).await.unwrap().unwrap();
    assert_eq!(profile.xp, 4.0);

    let reversal = cache
        .activity()
        .on_message_deleted(2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reversal.outcome.xp, 2.0);
    assert!(kv.get("message:2").await.unwrap().is_none());

    cache.trigger_sync().await;
    assert_eq!(durable.count("message_events").await, 1);

    // 已同步的消息无法撤销
    assert!(cache.activity().on_message_deleted(1).await.unwrap().is_none());
    let profile = cache.repository().get_profile(user_id).await.unwrap().unwrap();
    assert_eq!(profile.xp, 2.0);
}

/// 同一事件的并发撤销只扣回一次经验
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reversal_deducts_once() {
    let (_, _, cache) = memory_cache();
    let cache = Arc::new(cache);
    cache
        .activity()
        .on_reaction_added(50, 9, "👍", 10)
        .await
        .unwrap();
    cache.on_user_activity(9, 10.0).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache
                .on_event_reversed(
                    EntityKind::Reaction,
                    vec!["50".into(), "9".into(), "👍".into()],
                )
                .await
                .unwrap()
        }));
    }
    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    let profile = cache.repository().get_profile(9).await.unwrap().unwrap();
    assert_eq!(profile.xp, 10.0);
}

/// 用户档案不能作为事件撤销
#[tokio::test]
async fn test_profiles_cannot_be_reversed() {
    let (_, _, cache) = memory_cache();
    cache.on_user_activity(1, 1.0).await.unwrap();
    let err = cache
        .on_event_reversed(EntityKind::User, vec!["1".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

/// 语音会话按整分钟计算经验并落盘
#[tokio::test]
async fn test_voice_session_flow() {
    let (_, durable, cache) = memory_cache();
    let activity = cache.activity();

    assert!(activity.voice_leave(4, 500).await.unwrap().is_none());

    activity.voice_join(4, 1_000);
    activity.voice_join(4, 1_100);
    assert!(activity.voice_sessions().is_active(4));

    let outcome = activity.voice_leave(4, 1_000 + 10 * 60 + 59).await.unwrap().unwrap();
    assert!((outcome.xp - 3.0).abs() < 1e-9);
    assert!(!activity.voice_sessions().is_active(4));

    cache.trigger_sync().await;
    let docs = durable
        .find("voice_sessions", &Filter::eq("user_id", 4), None)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["session_start"], 1_000);
    assert_eq!(docs[0]["minutes"], 10.0);
}

/// 不足一分钟的语音会话不产生经验，也不留下事件
#[tokio::test]
async fn test_short_voice_session_leaves_nothing() {
    let (kv, durable, cache) = memory_cache();
    let activity = cache.activity();

    activity.voice_join(11, 3_000);
    assert!(activity.voice_leave(11, 3_000 + 59).await.unwrap().is_none());
    assert!(!activity.voice_sessions().is_active(11));

    let (_, keys) = kv.scan("voice:*", 0, 10).await.unwrap();
    assert!(keys.is_empty());
    assert!(cache.repository().get_profile(11).await.unwrap().is_none());

    let report = cache.trigger_sync().await;
    assert_eq!(report.total_synced(), 0);
    assert_eq!(durable.count("voice_sessions").await, 0);
}

/// 每日奖励冷却在同步前后都生效
#[tokio::test]
async fn test_daily_claim_cooldown_survives_sync() {
    let (_, _, cache) = memory_cache();
    let user_id = generate_unique_user_id();
    let economy = cache.economy();

    let first = economy.claim(user_id, ClaimType::Daily, 10 * DAY).await.unwrap();
    assert_eq!(
        first,
        ClaimOutcome::Granted {
            amount: 11,
            new_balance: 11
        }
    );

    cache.trigger_sync().await;
    let again = economy
        .claim(user_id, ClaimType::Daily, 10 * DAY + 100)
        .await
        .unwrap();
    assert_eq!(
        again,
        ClaimOutcome::OnCooldown {
            remaining_secs: DAY - 100
        }
    );

    let next_day = economy
        .claim(user_id, ClaimType::Daily, 11 * DAY)
        .await
        .unwrap();
    assert!(matches!(next_day, ClaimOutcome::Granted { new_balance: 22, .. }));
}

/// 并发领取同一奖励只有一次成功
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_grant_once() {
    let (_, _, cache) = memory_cache();
    let cache = Arc::new(cache);
    let mut handles = Vec::new();
    for _ in 0..6 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache
                .economy()
                .claim(77, ClaimType::Weekly, 1_000_000)
                .await
                .unwrap()
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), ClaimOutcome::Granted { .. }) {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    let profile = cache.repository().get_profile(77).await.unwrap().unwrap();
    assert_eq!(profile.balance, 77);
}

/// 余额不足的购买被拒绝；成功的购买在同步后可查询
#[tokio::test]
async fn test_purchase_and_history() {
    let (_, _, cache) = memory_cache();
    let economy = cache.economy();
    for (name, price) in [("crown", 100), ("hat", 30), ("cape", 50)] {
        economy.add_item(name, price, None, 0).await.unwrap();
    }

    let err = economy.purchase(5, "crown", 1).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    cache.on_grant_or_spend(5, 100, false).await.unwrap();
    economy.purchase(5, "hat", 2).await.unwrap();
    let last = economy.purchase(5, "cape", 3).await.unwrap();
    assert_eq!(last.new_balance, 20);

    assert!(economy.purchase_history(5, 10).await.unwrap().is_empty());
    cache.trigger_sync().await;

    let history = economy.purchase_history(5, 10).await.unwrap();
    let names: Vec<&str> = history.iter().map(|p| p.item_name.as_str()).collect();
    assert_eq!(names, vec!["cape", "hat"]);
    assert_eq!(history[0].new_balance, 20);
}

/// 下架或删除的商品无法购买，目录改动立即生效
#[tokio::test]
async fn test_catalog_controls_purchases() {
    let (_, durable, cache) = memory_cache();
    let economy = cache.economy();
    cache.on_grant_or_spend(9, 60, false).await.unwrap();

    economy
        .add_item("lantern", 45, Some("lights the way"), 10)
        .await
        .unwrap();
    economy.toggle_item("lantern").await.unwrap();
    assert!(economy.purchase(9, "lantern", 11).await.is_err());
    assert!(economy.list_items(true).await.unwrap().is_empty());

    economy.toggle_item("lantern").await.unwrap();
    let event = economy.purchase(9, "lantern", 12).await.unwrap();
    assert_eq!(event.item_price, 45);
    assert_eq!(event.new_balance, 15);

    economy.remove_item("lantern").await.unwrap();
    assert!(economy.purchase(9, "lantern", 13).await.is_err());
    assert_eq!(durable.count("marketplace_items").await, 0);
    assert_eq!(cache.repository().get_profile(9).await.unwrap().unwrap().balance, 15);
}

/// 扣款可以选择在零处截断
#[tokio::test]
async fn test_spend_with_floor() {
    let (_, _, cache) = memory_cache();
    cache.on_grant_or_spend(6, 40, false).await.unwrap();
    assert_eq!(cache.on_grant_or_spend(6, -100, true).await.unwrap(), 0);
    assert!(cache.on_grant_or_spend(6, -1, false).await.is_err());
}

/// 档案丢失后从持久层恢复展示数据
#[tokio::test]
async fn test_display_after_cache_loss() {
    let kv = Arc::new(MemoryKvStore::new());
    let durable = Arc::new(MemoryDocumentStore::new());
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());
    cache.on_user_activity(12, 250.0).await.unwrap();
    cache.trigger_sync().await;

    kv.delete(&["user:12".to_string()]).await.unwrap();
    let view = cache.get_profile_for_display(12).await.unwrap().unwrap();
    assert_eq!(view.profile.level, 3);
    assert_eq!(view.progress.xp_into_level, 45.0);
    assert!(kv.get("user:12").await.unwrap().is_some());
}

/// 后台任务定期同步，关闭后不再运行
#[tokio::test]
async fn test_background_sync_runs_and_stops() {
    let mut config = memory_config();
    config.sync.interval_secs = 1;
    config.sync.run_on_start = true;
    let kv = Arc::new(MemoryKvStore::new());
    let durable = Arc::new(MemoryDocumentStore::new());
    let cache = cache_with(config, kv.clone(), durable.clone());

    cache
        .on_transient_event(&Record::Message(xpsync::model::MessageEvent {
            message_id: 1,
            user_id: 1,
            xp_value: 2.0,
            timestamp: 1,
        }))
        .await
        .unwrap();
    cache.start_background().await.unwrap();

    let mut drained = false;
    for _ in 0..50 {
        if kv.is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(drained);
    assert_eq!(durable.count("message_events").await, 1);

    cache.shutdown().await.unwrap();
    assert!(cache.start_background().await.is_err());
    assert!(cache.metrics().last_run("sync").is_some());
}
