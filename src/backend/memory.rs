//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内KV存储，语义与Redis子集一致，用于开发和测试。

use super::{KeyTtl, KvStore};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// 进程内KV存储
///
/// 值: (数据, 过期时间)；过期在访问时惰性清除
///
/// 扫描游标对应上一页最后一个键，下一页从其后继续。
/// 扫描期间删除已返回的键不会跳过剩余的键
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<DashMap<String, (Vec<u8>, Option<Instant>)>>,
    cursors: Arc<DashMap<u64, String>>,
    next_cursor: Arc<AtomicU64>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的键数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| !is_expired(e.value().1, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取并清除已过期的条目
    fn live(&self, key: &str) -> Option<(Vec<u8>, Option<Instant>)> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if is_expired(entry.1, now) {
            self.entries.remove_if(key, |_, v| is_expired(v.1, now));
            debug!("memory kv: key={} expired, removed", key);
            return None;
        }
        Some(entry)
    }
}

fn is_expired(deadline: Option<Instant>, now: Instant) -> bool {
    matches!(deadline, Some(at) if now >= at)
}

#[async_trait]
impl KvStore for MemoryKvStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.live(key).map(|(bytes, _)| bytes))
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let deadline = ttl.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        if self.live(key).is_none() {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.1 = Some(Instant::now() + Duration::from_secs(ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        Ok(match self.live(key) {
            None => KeyTtl::Missing,
            Some((_, None)) => KeyTtl::Persistent,
            Some((_, Some(at))) => {
                let remaining = at.saturating_duration_since(Instant::now());
                // 与Redis一致，按秒向上取整
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                KeyTtl::Expiring(secs)
            }
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        // 未知游标按新扫描处理
        let resume_after = match cursor {
            0 => None,
            c => self.cursors.remove(&c).map(|(_, key)| key),
        };
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !is_expired(e.value().1, now) && glob_match(pattern, e.key()))
            .filter(|e| resume_after.as_deref().map_or(true, |after| e.key().as_str() > after))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();

        let limit = count.max(1);
        if keys.len() <= limit {
            return Ok((0, keys));
        }
        keys.truncate(limit);
        // 0 保留为扫描结束
        let next = self.next_cursor.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(last) = keys.last() {
            self.cursors.insert(next, last.clone());
        }
        Ok((next, keys))
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|(_, (_, deadline))| !is_expired(*deadline, now))
            .count();
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Redis风格的通配符匹配，支持 `*` 与 `?`
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
