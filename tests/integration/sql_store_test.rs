//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! SQL文档存储集成测试，使用 SQLite 作为后端

#[path = "../common/mod.rs"]
mod common;

use common::{cache_with, memory_config, setup_logging};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use xpsync::backend::MemoryKvStore;
use xpsync::config::DurableConfig;
use xpsync::database::{DurableStore, Filter, SqlDocumentStore, INTERNAL_ID_FIELD};
use xpsync::serialization::Document;
use xpsync::SyncError;

fn durable_config(connection_string: &str) -> DurableConfig {
    DurableConfig {
        connection_string: SecretString::new(connection_string.to_string().into()),
        ..Default::default()
    }
}

async fn memory_store() -> SqlDocumentStore {
    setup_logging();
    SqlDocumentStore::connect(&durable_config("sqlite::memory:"))
        .await
        .expect("sqlite memory store should open")
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

#[tokio::test]
async fn test_insert_and_find_newest_first() {
    let store = memory_store().await;
    for t in 1..=3 {
        store
            .insert(
                "purchase_events",
                doc(json!({"user_id": 7, "item_name": format!("item{}", t), "purchase_time": t})),
            )
            .await
            .unwrap();
    }
    store
        .insert("purchase_events", doc(json!({"user_id": 8, "item_name": "other"})))
        .await
        .unwrap();

    let found = store
        .find("purchase_events", &Filter::eq("user_id", 7), Some(2))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["item_name"], "item3");
    assert_eq!(found[1]["item_name"], "item2");
    assert!(found[0].contains_key(INTERNAL_ID_FIELD));

    let all = store
        .find("purchase_events", &Filter::default(), None)
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_upsert_replaces_by_identity() {
    let store = memory_store().await;
    let filter = Filter::eq("user_id", 42);
    store
        .upsert("user_profiles", &filter, doc(json!({"user_id": 42, "xp": 10.0})))
        .await
        .unwrap();
    store
        .upsert("user_profiles", &filter, doc(json!({"user_id": 42, "xp": 99.5})))
        .await
        .unwrap();

    let found = store
        .find("user_profiles", &filter, None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["xp"], 99.5);
}

#[tokio::test]
async fn test_compound_filter() {
    let store = memory_store().await;
    for (user_id, claim_type, claim_time) in [(1, "daily", 10), (1, "weekly", 20), (2, "daily", 30)] {
        store
            .insert(
                "economy_claims",
                doc(json!({"user_id": user_id, "claim_type": claim_type, "claim_time": claim_time})),
            )
            .await
            .unwrap();
    }
    let found = store
        .find_one(
            "economy_claims",
            &Filter::eq("user_id", 1).and("claim_type", "daily"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["claim_time"], 10);
}

#[tokio::test]
async fn test_rejects_unsafe_identifiers() {
    let store = memory_store().await;
    let err = store
        .insert("events; DROP TABLE x", Document::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    let err = store
        .find("message_events", &Filter::eq("user_id) OR (1=1", 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert!(store
        .upsert("user_profiles", &Filter::default(), Document::new())
        .await
        .is_err());
}

#[tokio::test]
async fn test_delete_by_filter() {
    let store = memory_store().await;
    for name in ["hat", "cape"] {
        store
            .upsert(
                "marketplace_items",
                &Filter::eq("name", name),
                doc(json!({"name": name, "price": 5})),
            )
            .await
            .unwrap();
    }
    let removed = store
        .delete("marketplace_items", &Filter::eq("name", "hat"))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let left = store
        .find("marketplace_items", &Filter::default(), None)
        .await
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["name"], "cape");

    // 删除后可以重新上架同名商品
    store
        .upsert(
            "marketplace_items",
            &Filter::eq("name", "hat"),
            doc(json!({"name": "hat", "price": 7})),
        )
        .await
        .unwrap();
    assert!(store
        .delete("marketplace_items", &Filter::default())
        .await
        .is_err());
}

#[tokio::test]
async fn test_file_database_persists_across_connections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("engagement.db");
    let url = format!("sqlite:{}", path.display());

    {
        let store = SqlDocumentStore::connect(&durable_config(&url)).await.unwrap();
        store.ping().await.unwrap();
        store
            .insert("message_events", doc(json!({"message_id": 5, "user_id": 1})))
            .await
            .unwrap();
    }
    assert!(path.exists());

    let store = SqlDocumentStore::connect(&durable_config(&url)).await.unwrap();
    let found = store
        .find("message_events", &Filter::eq("message_id", 5), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

/// 缓存同步到 SQLite 后可按用户查询
#[tokio::test]
async fn test_cache_syncs_into_sqlite() {
    let durable = Arc::new(memory_store().await);
    let kv = Arc::new(MemoryKvStore::new());
    let cache = cache_with(memory_config(), kv.clone(), durable.clone());

    cache.activity().on_message(30, 1, 100).await.unwrap();
    cache.activity().on_message(30, 2, 101).await.unwrap();
    cache.on_grant_or_spend(30, 50, false).await.unwrap();
    cache.economy().add_item("frame", 20, None, 99).await.unwrap();
    cache.economy().purchase(30, "frame", 102).await.unwrap();

    let report = cache.trigger_sync().await;
    assert_eq!(report.total_failures(), 0);
    assert_eq!(report.total_synced(), 4);

    let profile = durable
        .find_one("user_profiles", &Filter::eq("user_id", 30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile["xp"], 4.0);
    assert_eq!(profile["balance"], 30);

    let history = cache.economy().purchase_history(30, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].item_name, "frame");

    cache.on_user_activity(30, 1.0).await.unwrap();
    cache.trigger_sync().await;
    let profiles = durable
        .find("user_profiles", &Filter::eq("user_id", 30), None)
        .await
        .unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["xp"], 5.0);
}
