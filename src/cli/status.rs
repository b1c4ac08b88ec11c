//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了状态查询命令。

use crate::cli::StatusArgs;
use crate::manager::{EngagementCache, ProfileView, StoreHealth};
use crate::model::EntityKind;
use crate::sync::SyncPhase;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Serialize)]
struct StatusReport {
    service: String,
    health: StoreHealth,
    phases: Vec<(EntityKind, SyncPhase)>,
    /// Prometheus 文本格式的计数
    counters: String,
    profile: Option<ProfileView>,
}

pub async fn execute(cache: &EngagementCache, args: &StatusArgs) -> Result<()> {
    let profile = match args.user {
        Some(user_id) => cache
            .get_profile_for_display(user_id)
            .await
            .with_context(|| format!("Failed to load profile for user {}", user_id))?,
        None => None,
    };
    let report = StatusReport {
        service: cache.config().global.service_name.clone(),
        health: cache.health().await,
        phases: cache.sync_phases(),
        counters: cache.metrics().render(),
        profile,
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode status")?
        );
    } else {
        print_status(&report, args.user);
    }
    Ok(())
}

fn print_status(report: &StatusReport, user: Option<u64>) {
    println!("=== {} Status ===\n", report.service);
    println!("KV store:      {}", describe(&report.health.kv));
    println!("Durable store: {}", describe(&report.health.durable));

    println!("\nSync phases:");
    for (kind, phase) in &report.phases {
        println!("  {:<10} {}", kind.to_string(), phase);
    }

    if !report.counters.is_empty() {
        println!("\nCounters:");
        for line in report.counters.lines() {
            println!("  {}", line);
        }
    }

    if let Some(user_id) = user {
        println!();
        match &report.profile {
            Some(view) => {
                println!("User {}:", user_id);
                println!("  Level:   {}", view.profile.level);
                println!("  XP:      {:.1}", view.profile.xp);
                println!(
                    "  Next:    {:.1} / {}",
                    view.progress.xp_into_level, view.progress.required_for_next
                );
                println!("  Balance: {}", view.profile.balance);
            }
            None => println!("User {} has no profile yet.", user_id),
        }
    }
}

fn describe(state: &std::result::Result<(), String>) -> String {
    match state {
        Ok(()) => "✅ HEALTHY".to_string(),
        Err(e) => format!("❌ UNREACHABLE ({})", e),
    }
}
