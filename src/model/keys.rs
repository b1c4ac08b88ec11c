//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 复合键的编码与解析。
//!
//! 键格式为 `<prefix>:<part1>:...:<partN>`，每种实体类型的组成部分数量固定。
//! 解析时最后一个部分会吸收剩余的所有分隔符，因此像 `:custom:` 这样的表情可以原样保留。

use super::EntityKind;
use crate::error::{Result, SyncError};
use std::fmt;

/// 键分隔符
pub const KEY_DELIMITER: char = ':';

/// 类型化的复合键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    kind: EntityKind,
    parts: Vec<String>,
}

impl EntityKey {
    /// 创建复合键
    ///
    /// # 参数
    ///
    /// * `kind` - 实体类型
    /// * `parts` - 前缀之后的组成部分
    ///
    /// # 返回值
    ///
    /// 组成部分数量与类型不符、为空，或非末尾部分包含分隔符时返回 `InvalidKey`
    pub fn new(kind: EntityKind, parts: Vec<String>) -> Result<Self> {
        if parts.len() != kind.key_arity() {
            return Err(SyncError::InvalidKey(format!(
                "{} keys take {} parts, got {}",
                kind,
                kind.key_arity(),
                parts.len()
            )));
        }
        let last = parts.len() - 1;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(SyncError::InvalidKey(format!(
                    "{} key part {} is empty",
                    kind, i
                )));
            }
            if i < last && part.contains(KEY_DELIMITER) {
                return Err(SyncError::InvalidKey(format!(
                    "{} key part {} ('{}') contains the delimiter",
                    kind, i, part
                )));
            }
        }
        Ok(Self { kind, parts })
    }

    /// 解析原始键
    pub fn parse(raw: &str) -> Result<Self> {
        let (prefix, rest) = raw
            .split_once(KEY_DELIMITER)
            .ok_or_else(|| SyncError::InvalidKey(format!("'{}' has no prefix", raw)))?;
        let kind = EntityKind::from_prefix(prefix)
            .ok_or_else(|| SyncError::InvalidKey(format!("unknown key prefix in '{}'", raw)))?;
        let parts: Vec<String> = rest
            .splitn(kind.key_arity(), KEY_DELIMITER)
            .map(str::to_string)
            .collect();
        Self::new(kind, parts).map_err(|e| match e {
            SyncError::InvalidKey(reason) => SyncError::InvalidKey(format!("'{}': {}", raw, reason)),
            other => other,
        })
    }

    /// 编码为原始键
    pub fn encode(&self) -> String {
        let mut out = String::from(self.kind.prefix());
        for part in &self.parts {
            out.push(KEY_DELIMITER);
            out.push_str(part);
        }
        out
    }

    /// 匹配指定前导部分的SCAN模式，例如 `claim:daily:42:*`
    pub fn prefix_pattern(kind: EntityKind, leading: &[String]) -> Result<String> {
        if leading.len() >= kind.key_arity() {
            return Err(SyncError::InvalidKey(format!(
                "{} keys take {} parts, pattern gave {}",
                kind,
                kind.key_arity(),
                leading.len()
            )));
        }
        let mut out = String::from(kind.prefix());
        for part in leading {
            let has_glob = part.contains(|c| matches!(c, '*' | '?' | '['));
            if part.is_empty() || part.contains(KEY_DELIMITER) || has_glob {
                return Err(SyncError::InvalidKey(format!(
                    "pattern part '{}' is not a literal key part",
                    part
                )));
            }
            out.push(KEY_DELIMITER);
            out.push_str(part);
        }
        out.push(KEY_DELIMITER);
        out.push('*');
        Ok(out)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    /// 将组成部分解析为无符号整数
    pub fn part_u64(&self, index: usize) -> Result<u64> {
        self.parse_part(index)
    }

    /// 将组成部分解析为有符号整数（用于时间戳）
    pub fn part_i64(&self, index: usize) -> Result<i64> {
        self.parse_part(index)
    }

    fn parse_part<T: std::str::FromStr>(&self, index: usize) -> Result<T> {
        let raw = self.part(index).ok_or_else(|| {
            SyncError::InvalidKey(format!("'{}' has no part {}", self.encode(), index))
        })?;
        raw.parse().map_err(|_| {
            SyncError::InvalidKey(format!(
                "'{}' part {} ('{}') is not a number",
                self.encode(),
                index,
                raw
            ))
        })
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
