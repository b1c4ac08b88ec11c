//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 按键串行化的异步锁。
//!
//! 同一个键上的临界区依次执行，不同键互不阻塞；没有持有者的条目在释放时清除。

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按键加锁的互斥表
#[derive(Debug)]
pub struct KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取键上的锁，守卫释放时解锁
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key: Some(key),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// 当前登记的键数量
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// 键锁守卫
pub struct KeyedGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: Option<K>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Drop for KeyedGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // 先释放锁，再回收无人引用的条目
        self.guard.take();
        if let Some(key) = self.key.take() {
            self.locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}
