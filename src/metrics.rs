//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步与修复任务的指标收集。

use crate::model::EntityKind;
use dashmap::DashMap;
use std::fmt::Write;

/// 指标收集器
///
/// 按实体类型累计计数，由调用方注入，不使用全局实例
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// key: "kind:counter"
    counters: DashMap<String, u64>,
    /// 最近一次运行的Unix时间戳，key: "sync" / "repair"
    last_run: DashMap<&'static str, i64>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累加计数
    ///
    /// # 参数
    ///
    /// * `kind` - 实体类型
    /// * `counter` - 计数名称（synced/failed/deleted/repaired/vanished/passes）
    /// * `value` - 增量
    pub fn add(&self, kind: EntityKind, counter: &str, value: u64) {
        if value == 0 {
            return;
        }
        *self
            .counters
            .entry(format!("{}:{}", kind, counter))
            .or_insert(0) += value;
    }

    /// 读取计数
    pub fn get(&self, kind: EntityKind, counter: &str) -> u64 {
        self.counters
            .get(&format!("{}:{}", kind, counter))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// 记录任务运行时间
    pub fn mark_run(&self, task: &'static str, at: i64) {
        self.last_run.insert(task, at);
    }

    pub fn last_run(&self, task: &'static str) -> Option<i64> {
        self.last_run.get(task).map(|v| *v)
    }

    /// 渲染为 Prometheus 文本格式
    pub fn render(&self) -> String {
        let mut entries: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        entries.sort();

        let mut output = String::new();
        for (key, value) in entries {
            if let Some((kind, counter)) = key.split_once(':') {
                let _ = writeln!(
                    output,
                    "xpsync_{}_total{{kind=\"{}\"}} {}",
                    counter, kind, value
                );
            }
        }
        let mut runs: Vec<(&'static str, i64)> =
            self.last_run.iter().map(|e| (*e.key(), *e.value())).collect();
        runs.sort();
        for (task, at) in runs {
            let _ = writeln!(
                output,
                "xpsync_last_run_timestamp_seconds{{task=\"{}\"}} {}",
                task, at
            );
        }
        output
    }
}
