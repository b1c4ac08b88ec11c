//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内文档存储，语义与SQL实现一致。

use super::{validate_identifier, DurableStore, Filter, INTERNAL_ID_FIELD};
use crate::error::{Result, SyncError};
use crate::serialization::Document;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Debug, Clone)]
struct StoredDocument {
    id: u64,
    identity: Option<String>,
    document: Document,
}

/// 进程内文档存储
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
    next_id: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 集合中的文档数量
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl DurableStore for MemoryDocumentStore {
    #[instrument(skip(self, document), level = "debug")]
    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        validate_identifier(collection)?;
        let id = self.allocate_id();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id,
                identity: None,
                document,
            });
        Ok(())
    }

    #[instrument(skip(self, document), level = "debug")]
    async fn upsert(&self, collection: &str, filter: &Filter, document: Document) -> Result<()> {
        validate_identifier(collection)?;
        filter.validate()?;
        let identity = filter.identity();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs
            .iter_mut()
            .find(|d| d.identity.as_deref() == Some(identity.as_str()))
        {
            Some(existing) => existing.document = document,
            None => {
                let id = self.allocate_id();
                docs.push(StoredDocument {
                    id,
                    identity: Some(identity),
                    document,
                });
            }
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<u64>,
    ) -> Result<Vec<Document>> {
        validate_identifier(collection)?;
        filter.validate()?;
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(docs
            .iter()
            .rev()
            .filter(|d| filter.matches(&d.document))
            .take(limit)
            .map(|d| {
                let mut document = d.document.clone();
                document.insert(INTERNAL_ID_FIELD.to_string(), Value::from(d.id));
                document
            })
            .collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64> {
        validate_identifier(collection)?;
        if filter.is_empty() {
            return Err(SyncError::Validation(
                "delete requires a non-empty filter".to_string(),
            ));
        }
        filter.validate()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(&d.document));
        Ok((before - docs.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
