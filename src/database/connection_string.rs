//! 连接字符串规范化模块
//!
//! 识别持久层类型，规范化 SQLite 路径，并在打开文件数据库前创建所在目录。

use crate::error::{Result, SyncError};
use std::path::{Path, PathBuf};

/// 数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    SQLite,
    MySQL,
    PostgreSQL,
    /// 进程内文档存储
    Memory,
}

impl DbType {
    /// 从连接字符串推断数据库类型
    pub fn from_connection_string(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        if lower == "memory" || lower.starts_with("memory:") {
            DbType::Memory
        } else if lower.starts_with("mysql") {
            DbType::MySQL
        } else if lower.starts_with("postgres") {
            DbType::PostgreSQL
        } else {
            DbType::SQLite
        }
    }
}

/// 是否为 SQLite 内存数据库
pub fn is_sqlite_memory(s: &str) -> bool {
    DbType::from_connection_string(s) == DbType::SQLite && s.contains(":memory:")
}

/// 提取 SQLite 数据库文件路径，内存数据库返回 None
pub fn sqlite_path(s: &str) -> Option<PathBuf> {
    if DbType::from_connection_string(s) != DbType::SQLite || is_sqlite_memory(s) {
        return None;
    }
    let rest = s.strip_prefix("sqlite:").unwrap_or(s);
    let path = rest.split('?').next().unwrap_or_default();
    let path = if let Some(abs) = path.strip_prefix("///") {
        format!("/{}", abs)
    } else if let Some(abs) = path.strip_prefix("//") {
        format!("/{}", abs)
    } else {
        path.to_string()
    };
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// 规范化 SQLite 连接字符串
///
/// - 内存数据库: `sqlite::memory:`
/// - 文件: `sqlite:<path>?mode=rwc`，不存在时自动创建
pub fn normalize_sqlite(s: &str) -> String {
    if is_sqlite_memory(s) {
        return "sqlite::memory:".to_string();
    }
    let params = s.split_once('?').map(|(_, p)| p.to_string());
    match sqlite_path(s) {
        Some(path) => {
            let display = path.to_string_lossy();
            let path = if path.is_absolute() || display.starts_with("./") || display.starts_with("../")
            {
                display.to_string()
            } else {
                format!("./{}", display)
            };
            match params {
                Some(p) if !p.is_empty() => format!("sqlite:{}?{}", path, p),
                _ => format!("sqlite:{}?mode=rwc", path),
            }
        }
        None => "sqlite::memory:".to_string(),
    }
}

/// 准备连接字符串：SQLite 文件数据库会创建父目录并规范化
pub fn prepare_connection_string(s: &str) -> Result<String> {
    match DbType::from_connection_string(s) {
        DbType::SQLite => {
            if let Some(path) = sqlite_path(s) {
                ensure_parent_directory(&path)?;
            }
            Ok(normalize_sqlite(s))
        }
        _ => Ok(s.trim().to_string()),
    }
}

fn ensure_parent_directory(path: &Path) -> Result<()> {
    let full_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    if let Some(parent) = full_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::DatabaseError(format!(
                    "无法创建数据库目录 {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}
