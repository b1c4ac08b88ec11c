//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 sea-orm 的SQL文档存储。
//!
//! 每个集合对应一张表：自增 `id`、可空唯一的 `doc_identity`（upsert 键）、
//! JSON 文本 `document` 以及创建/更新时间。过滤条件通过各方言的 JSON 提取函数实现。

use super::{
    connection_string::{is_sqlite_memory, prepare_connection_string},
    validate_identifier, value_text, DurableStore, Filter, INTERNAL_ID_FIELD,
};
use crate::config::DurableConfig;
use crate::error::{Result, SyncError};
use crate::serialization::Document;
use crate::utils::redaction::Redacted;
use async_trait::async_trait;
use dashmap::DashSet;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, Value as SqlValue,
};
use secrecy::ExposeSecret;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// upsert 身份串的最大长度
const MAX_IDENTITY_LEN: usize = 255;

/// SQL文档存储
pub struct SqlDocumentStore {
    connection: Arc<DatabaseConnection>,
    backend: DatabaseBackend,
    query_timeout: Duration,
    ready: DashSet<String>,
}

impl SqlDocumentStore {
    /// 按配置连接数据库
    #[instrument(skip(config), level = "info", name = "init_sql_store")]
    pub async fn connect(config: &DurableConfig) -> Result<Self> {
        let raw = config.connection_string.expose_secret();
        let url = prepare_connection_string(raw)?;

        let mut opt = ConnectOptions::new(url.clone());
        opt.connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .sqlx_logging(false);
        if is_sqlite_memory(&url) {
            // 每个连接都是独立的内存库，只能保留一个
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(config.max_connections);
        }

        let connection = Database::connect(opt)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to open database: {}", e)))?;
        let store = Self::from_connection(
            connection,
            Duration::from_millis(config.query_timeout_ms),
        );
        info!(
            "SQL document store connected to {} (backend: {:?})",
            Redacted(&url),
            store.backend
        );
        Ok(store)
    }

    /// 使用已有连接创建
    pub fn from_connection(connection: DatabaseConnection, query_timeout: Duration) -> Self {
        let backend = connection.get_database_backend();
        Self {
            connection: Arc::new(connection),
            backend,
            query_timeout,
            ready: DashSet::new(),
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// 转义SQL标识符
    fn escape_identifier(&self, identifier: &str) -> String {
        match self.backend {
            DatabaseBackend::MySql => format!("`{}`", identifier),
            _ => format!("\"{}\"", identifier),
        }
    }

    /// 第 `n` 个参数占位符（从1开始）
    fn placeholder(&self, n: usize) -> String {
        match self.backend {
            DatabaseBackend::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    /// 提取文档顶层字段的文本值
    fn field_expr(&self, field: &str) -> String {
        match self.backend {
            DatabaseBackend::Postgres => format!("(document::jsonb ->> '{}')", field),
            DatabaseBackend::MySql => {
                format!("JSON_UNQUOTE(JSON_EXTRACT(document, '$.{}'))", field)
            }
            DatabaseBackend::Sqlite => {
                format!("CAST(json_extract(document, '$.{}') AS TEXT)", field)
            }
        }
    }

    fn create_table_sql(&self, table: &str) -> String {
        let columns = match self.backend {
            DatabaseBackend::MySql => {
                "id BIGINT AUTO_INCREMENT PRIMARY KEY, \
                 doc_identity VARCHAR(255) NULL UNIQUE, \
                 document LONGTEXT NOT NULL, \
                 created_at BIGINT NOT NULL, \
                 updated_at BIGINT NOT NULL"
            }
            DatabaseBackend::Postgres => {
                "id BIGSERIAL PRIMARY KEY, \
                 doc_identity VARCHAR(255) UNIQUE, \
                 document TEXT NOT NULL, \
                 created_at BIGINT NOT NULL, \
                 updated_at BIGINT NOT NULL"
            }
            DatabaseBackend::Sqlite => {
                "id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 doc_identity TEXT UNIQUE, \
                 document TEXT NOT NULL, \
                 created_at INTEGER NOT NULL, \
                 updated_at INTEGER NOT NULL"
            }
        };
        format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns)
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sea_orm::DbErr>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(res) => res.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(format!(
                "sql {} exceeded {}ms",
                op,
                self.query_timeout.as_millis()
            ))),
        }
    }

    /// 执行语句，返回受影响的行数
    async fn execute(&self, op: &str, sql: String, values: Vec<SqlValue>) -> Result<u64> {
        let stmt = Statement::from_sql_and_values(self.backend, sql, values);
        let result = self.bounded(op, self.connection.execute(stmt)).await?;
        Ok(result.rows_affected())
    }

    /// 由过滤条件生成 WHERE 子句及参数
    fn where_clause(&self, filter: &Filter) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        let mut values = Vec::with_capacity(filter.clauses().len());
        for (i, (field, value)) in filter.clauses().iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!(
                "{} = {}",
                self.field_expr(field),
                self.placeholder(i + 1)
            ));
            values.push(SqlValue::from(value_text(value)));
        }
        (sql, values)
    }

    async fn query_all(
        &self,
        op: &str,
        sql: String,
        values: Vec<SqlValue>,
    ) -> Result<Vec<QueryResult>> {
        let stmt = Statement::from_sql_and_values(self.backend, sql, values);
        self.bounded(op, self.connection.query_all(stmt)).await
    }

    /// 确保集合对应的表存在，返回转义后的表名
    async fn ensure_collection(&self, collection: &str) -> Result<String> {
        validate_identifier(collection)?;
        let table = self.escape_identifier(collection);
        if !self.ready.contains(collection) {
            let sql = self.create_table_sql(&table);
            debug!("Creating collection table with SQL: {}", sql);
            self.execute("create_table", sql, Vec::new()).await?;
            self.ready.insert(collection.to_string());
        }
        Ok(table)
    }

    fn serialize_document(document: &Document) -> Result<String> {
        serde_json::to_string(document).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl DurableStore for SqlDocumentStore {
    #[instrument(skip(self, document), level = "debug")]
    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        let table = self.ensure_collection(collection).await?;
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {} (document, created_at, updated_at) VALUES ({}, {}, {})",
            table,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3)
        );
        let values = vec![
            SqlValue::from(Self::serialize_document(&document)?),
            SqlValue::from(now),
            SqlValue::from(now),
        ];
        self.execute("insert", sql, values).await?;
        Ok(())
    }

    #[instrument(skip(self, document), level = "debug")]
    async fn upsert(&self, collection: &str, filter: &Filter, document: Document) -> Result<()> {
        if filter.is_empty() {
            return Err(SyncError::Validation(
                "upsert requires a non-empty filter".to_string(),
            ));
        }
        filter.validate()?;
        let identity = filter.identity();
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(SyncError::Validation(format!(
                "upsert identity exceeds {} characters",
                MAX_IDENTITY_LEN
            )));
        }
        let table = self.ensure_collection(collection).await?;
        let now = chrono::Utc::now().timestamp();
        let conflict = match self.backend {
            DatabaseBackend::MySql => {
                "ON DUPLICATE KEY UPDATE document = VALUES(document), updated_at = VALUES(updated_at)"
            }
            _ => {
                "ON CONFLICT (doc_identity) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at"
            }
        };
        let sql = format!(
            "INSERT INTO {} (doc_identity, document, created_at, updated_at) VALUES ({}, {}, {}, {}) {}",
            table,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
            conflict
        );
        let values = vec![
            SqlValue::from(identity),
            SqlValue::from(Self::serialize_document(&document)?),
            SqlValue::from(now),
            SqlValue::from(now),
        ];
        self.execute("upsert", sql, values).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<u64>,
    ) -> Result<Vec<Document>> {
        filter.validate()?;
        let table = self.ensure_collection(collection).await?;

        let (clause, values) = self.where_clause(filter);
        let mut sql = format!("SELECT id, document FROM {}{}", table, clause);
        sql.push_str(" ORDER BY id DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = self.query_all("find", sql, values).await?;
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("", "id")?;
            let text: String = row.try_get("", "document")?;
            let mut document: Document = serde_json::from_str(&text)
                .map_err(|e| SyncError::decode(format!("{}#{}", collection, id), e))?;
            document.insert(INTERNAL_ID_FIELD.to_string(), serde_json::Value::from(id));
            documents.push(document);
        }
        Ok(documents)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64> {
        if filter.is_empty() {
            return Err(SyncError::Validation(
                "delete requires a non-empty filter".to_string(),
            ));
        }
        filter.validate()?;
        let table = self.ensure_collection(collection).await?;
        let (clause, values) = self.where_clause(filter);
        self.execute("delete", format!("DELETE FROM {}{}", table, clause), values)
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.connection.ping()).await
    }
}
