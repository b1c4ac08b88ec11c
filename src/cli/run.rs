//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了常驻运行命令。

use crate::manager::EngagementCache;
use anyhow::{Context, Result};
use tracing::info;

pub async fn execute(cache: &EngagementCache) -> Result<()> {
    cache
        .start_background()
        .await
        .context("Failed to start background tasks")?;
    info!("xpsync running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested, waiting for in-flight cycles");

    cache.shutdown().await.context("Graceful shutdown failed")?;
    info!("Final counters:\n{}", cache.metrics().render());
    Ok(())
}
