//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 用户档案仓库集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{generate_unique_user_id, memory_cache};
use std::sync::Arc;
use xpsync::backend::KvStore;
use xpsync::error::SyncError;

/// 并发的N次+1经验变更必须得到N
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_xp_deltas_are_not_lost() {
    let (_, _, cache) = memory_cache();
    let cache = Arc::new(cache);
    let user_id = generate_unique_user_id();

    let mut handles = Vec::new();
    for _ in 0..64 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.on_user_activity(user_id, 1.0).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let view = cache.get_profile_for_display(user_id).await.unwrap().unwrap();
    assert_eq!(view.profile.xp, 64.0);
    assert_eq!(view.profile.level, 1);
}

/// 100经验升到2级，204仍是2级，205升到3级
#[tokio::test]
async fn test_level_thresholds() {
    let (_, _, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    let outcome = cache.on_user_activity(user_id, 100.0).await.unwrap();
    assert!(outcome.leveled_up);
    assert_eq!(outcome.new_level, 2);

    let outcome = cache.on_user_activity(user_id, 104.0).await.unwrap();
    assert!(!outcome.leveled_up);
    assert_eq!(outcome.new_level, 2);

    let outcome = cache.on_user_activity(user_id, 1.0).await.unwrap();
    assert!(outcome.leveled_up);
    assert_eq!(outcome.previous_level, 2);
    assert_eq!(outcome.new_level, 3);

    let outcome = cache.on_activity_reversed(user_id, 1.0).await.unwrap();
    assert_eq!(outcome.new_level, 2);
}

/// 带下限的扣减截断到0，不带下限时拒绝且不修改
#[tokio::test]
async fn test_balance_floor_and_rejection() {
    let (_, _, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    assert_eq!(cache.on_grant_or_spend(user_id, 50, false).await.unwrap(), 50);
    let err = cache.on_grant_or_spend(user_id, -80, false).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert_eq!(
        cache
            .get_profile_for_display(user_id)
            .await
            .unwrap()
            .unwrap()
            .profile
            .balance,
        50
    );
    assert_eq!(cache.on_grant_or_spend(user_id, -80, true).await.unwrap(), 0);
}

/// KV中的档案丢失后从持久层回填
#[tokio::test]
async fn test_read_through_after_cache_loss() {
    let (kv, _, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    cache.on_user_activity(user_id, 150.0).await.unwrap();
    cache.on_grant_or_spend(user_id, 25, false).await.unwrap();
    let report = cache.trigger_sync().await;
    assert_eq!(report.total_synced(), 1);

    let key = format!("user:{}", user_id);
    kv.delete(&[key.clone()]).await.unwrap();
    assert!(kv.get(&key).await.unwrap().is_none());

    let view = cache.get_profile_for_display(user_id).await.unwrap().unwrap();
    assert_eq!(view.profile.xp, 150.0);
    assert_eq!(view.profile.level, 2);
    assert_eq!(view.profile.balance, 25);
    assert!(kv.get(&key).await.unwrap().is_some());
}

/// 管理员设置等级后等级仍由经验推导
#[tokio::test]
async fn test_set_level() {
    let (_, _, cache) = memory_cache();
    let user_id = generate_unique_user_id();

    let profile = cache.repository().set_level(user_id, 3).await.unwrap();
    assert_eq!(profile.xp, 205.0);
    assert_eq!(profile.level, 3);
}

/// KV中损坏的档案报告为解码错误
#[tokio::test]
async fn test_corrupt_profile_is_decode_error() {
    let (kv, _, cache) = memory_cache();
    let user_id = generate_unique_user_id();
    kv.set(&format!("user:{}", user_id), b"[1,2".to_vec(), None)
        .await
        .unwrap();
    let err = cache.get_profile_for_display(user_id).await.unwrap_err();
    assert!(matches!(err, SyncError::Decode { .. }));
}
