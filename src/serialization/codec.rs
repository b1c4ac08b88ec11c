//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 记录编解码器。
//!
//! KV负载是内部记录的扁平字段布局，类型由键前缀决定；
//! 持久层文档是同样布局的JSON对象，以 `_` 开头的字段属于存储内部字段，读取时丢弃。

use super::{JsonSerializer, Serializer, SerializerEnum};
use crate::error::{Result, SyncError};
use crate::model::{EntityKey, EntityKind, Record};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// 持久层文档
pub type Document = serde_json::Map<String, Value>;

/// 记录编解码器
#[derive(Clone, Debug, Default)]
pub struct RecordCodec {
    serializer: SerializerEnum,
}

impl RecordCodec {
    pub fn new(serializer: SerializerEnum) -> Self {
        Self { serializer }
    }

    /// 根据配置创建，`compress` 为 true 时KV负载使用gzip
    pub fn from_flag(compress: bool) -> Self {
        let json = if compress {
            JsonSerializer::with_compression()
        } else {
            JsonSerializer::new()
        };
        Self::new(SerializerEnum::Json(json))
    }

    /// 编码为KV负载
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        match record {
            Record::User(r) => self.serializer.serialize(r),
            Record::Message(r) => self.serializer.serialize(r),
            Record::Reaction(r) => self.serializer.serialize(r),
            Record::Voice(r) => self.serializer.serialize(r),
            Record::Claim(r) => self.serializer.serialize(r),
            Record::Purchase(r) => self.serializer.serialize(r),
        }
    }

    /// 按类型解码KV负载
    pub fn decode(&self, kind: EntityKind, bytes: &[u8]) -> Result<Record> {
        self.decode_as(kind, bytes)
            .map_err(|e| SyncError::decode(kind.to_string(), e))
    }

    /// 解码某个键下的负载，并把键中的身份字段合并进记录
    pub fn decode_entry(&self, key: &EntityKey, bytes: &[u8]) -> Result<Record> {
        let mut record = self
            .decode_as(key.kind(), bytes)
            .map_err(|e| SyncError::decode(key.encode(), e))?;
        record
            .absorb_key(key)
            .map_err(|e| SyncError::decode(key.encode(), e))?;
        Ok(record)
    }

    fn decode_as(&self, kind: EntityKind, bytes: &[u8]) -> Result<Record> {
        Ok(match kind {
            EntityKind::User => Record::User(self.serializer.deserialize(bytes)?),
            EntityKind::Message => Record::Message(self.serializer.deserialize(bytes)?),
            EntityKind::Reaction => Record::Reaction(self.serializer.deserialize(bytes)?),
            EntityKind::Voice => Record::Voice(self.serializer.deserialize(bytes)?),
            EntityKind::Claim => Record::Claim(self.serializer.deserialize(bytes)?),
            EntityKind::Purchase => Record::Purchase(self.serializer.deserialize(bytes)?),
        })
    }

    /// 转换为持久层文档
    pub fn to_document(&self, record: &Record) -> Result<Document> {
        match record {
            Record::User(r) => object(r),
            Record::Message(r) => object(r),
            Record::Reaction(r) => object(r),
            Record::Voice(r) => object(r),
            Record::Claim(r) => object(r),
            Record::Purchase(r) => object(r),
        }
    }

    /// 从持久层文档还原记录
    pub fn from_document(&self, kind: EntityKind, mut document: Document) -> Result<Record> {
        document.retain(|field, _| !field.starts_with('_'));
        let value = Value::Object(document);
        let record = match kind {
            EntityKind::User => Record::User(from_value(kind, value)?),
            EntityKind::Message => Record::Message(from_value(kind, value)?),
            EntityKind::Reaction => Record::Reaction(from_value(kind, value)?),
            EntityKind::Voice => Record::Voice(from_value(kind, value)?),
            EntityKind::Claim => Record::Claim(from_value(kind, value)?),
            EntityKind::Purchase => Record::Purchase(from_value(kind, value)?),
        };
        Ok(record)
    }
}

fn object<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value).map_err(|e| SyncError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(SyncError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn from_value<T: DeserializeOwned>(kind: EntityKind, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| SyncError::decode(kind.collection(), e))
}
