//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 周期任务调度。

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 启动周期任务
///
/// 每个周期完整等待 `job` 结束；取消只在周期之间生效，进行中的周期会跑完。
///
/// # 参数
///
/// * `name` - 任务名称，用于日志
/// * `period` - 周期
/// * `run_on_start` - 是否立即执行第一次
/// * `token` - 取消令牌
/// * `job` - 每个周期执行的任务
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    run_on_start: bool,
    token: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let start = if run_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Periodic task '{}' started, every {:?}", name, period);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    debug!("Periodic task '{}' tick", name);
                    job().await;
                }
            }
        }
        info!("Periodic task '{}' stopped", name);
    })
}
