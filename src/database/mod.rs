//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 持久层模块
//!
//! 以文档集合的形式保存同步后的记录，支持 SQLite、PostgreSQL、MySQL 与进程内存储

use crate::config::DurableConfig;
use crate::error::{Result, SyncError};
use crate::serialization::Document;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;

pub mod connection_string;
pub mod memory;
pub mod sql;

pub use connection_string::{prepare_connection_string, DbType};
pub use memory::MemoryDocumentStore;
pub use sql::SqlDocumentStore;

/// 存储内部的文档编号字段
pub const INTERNAL_ID_FIELD: &str = "_id";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("valid regex");
}

/// 校验集合名和字段名，防止注入
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "Invalid identifier '{}': only lowercase letters, digits and underscores are allowed",
            identifier
        )))
    }
}

/// 等值过滤条件（多个条件取交集）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// 单字段等值条件
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    /// 追加等值条件
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// 校验所有字段名
    pub fn validate(&self) -> Result<()> {
        for (field, _) in &self.clauses {
            validate_identifier(field)?;
        }
        Ok(())
    }

    /// 规范化身份串，upsert 以此判定同一文档
    pub fn identity(&self) -> String {
        let mut parts: Vec<String> = self
            .clauses
            .iter()
            .map(|(field, value)| format!("{}={}", field, value_text(value)))
            .collect();
        parts.sort();
        parts.join("&")
    }

    /// 判断文档是否满足条件，按文本形式比较
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            document
                .get(field)
                .map(|actual| value_text(actual) == value_text(expected))
                .unwrap_or(false)
        })
    }
}

/// 值的文本形式，与SQL端JSON提取结果保持一致
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 持久层接口
///
/// 文档存储语义：插入总是追加；upsert 按过滤条件替换或插入，不会产生重复
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 追加文档
    async fn insert(&self, collection: &str, document: Document) -> Result<()>;

    /// 按过滤条件替换或插入
    async fn upsert(&self, collection: &str, filter: &Filter, document: Document) -> Result<()>;

    /// 查询文档，最新的在前；每个文档带有 `_id` 字段
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<u64>,
    ) -> Result<Vec<Document>>;

    /// 查询单个文档（最新的一个）
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self
            .find(collection, filter, Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// 删除满足过滤条件的文档，返回删除数量；过滤条件不能为空
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// 健康检查
    async fn ping(&self) -> Result<()>;
}

/// 按配置打开持久层
pub async fn open_durable_store(config: &DurableConfig) -> Result<Arc<dyn DurableStore>> {
    let connection_string = config.connection_string.expose_secret();
    match DbType::from_connection_string(connection_string) {
        DbType::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        _ => Ok(Arc::new(SqlDocumentStore::connect(config).await?)),
    }
}
