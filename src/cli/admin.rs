//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理员操作命令的实现。

use crate::manager::EngagementCache;
use crate::model::{ItemUpdate, MarketItem};
use crate::sync::{RepairReport, SyncReport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AdminSubcommand {
    #[command(name = "sync", about = "Drain every cached entity kind into the durable store now")]
    Sync(ReportArgs),

    #[command(name = "cleanup", about = "Restore missing expirations on event log keys now")]
    Cleanup(ReportArgs),

    #[command(name = "item", about = "Manage the marketplace catalog")]
    Item(ItemArgs),
}

#[derive(Parser, Debug)]
pub struct ItemArgs {
    #[command(subcommand)]
    pub command: ItemSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ItemSubcommand {
    #[command(name = "add", about = "Add a new item to the marketplace")]
    Add {
        name: String,
        price: i64,
        #[arg(short, long)]
        description: Option<String>,
    },

    #[command(name = "remove", about = "Remove an item from the marketplace")]
    Remove { name: String },

    #[command(name = "update", about = "Update an item's price and/or description")]
    Update {
        name: String,
        #[arg(short, long)]
        price: Option<i64>,
        #[arg(short, long)]
        description: Option<String>,
    },

    #[command(name = "toggle", about = "Enable or disable an item")]
    Toggle { name: String },

    #[command(name = "list", about = "List marketplace items")]
    List {
        #[arg(long, help = "Only show items that can be bought")]
        available: bool,
        #[arg(short, long, help = "Output in JSON format")]
        json: bool,
    },
}

#[derive(Parser, Debug)]
pub struct ReportArgs {
    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

pub async fn execute(cache: &EngagementCache, args: &AdminArgs) -> Result<()> {
    match &args.command {
        AdminSubcommand::Sync(report_args) => {
            let report = cache.trigger_sync().await;
            if report_args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                print_sync_report(&report);
            }
        }
        AdminSubcommand::Cleanup(report_args) => {
            let report = cache.trigger_cleanup().await;
            if report_args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                print_repair_report(&report);
            }
        }
        AdminSubcommand::Item(item_args) => execute_item(cache, &item_args.command).await?,
    }
    Ok(())
}

async fn execute_item(cache: &EngagementCache, command: &ItemSubcommand) -> Result<()> {
    let economy = cache.economy();
    match command {
        ItemSubcommand::Add {
            name,
            price,
            description,
        } => {
            let item = economy
                .add_item(name, *price, description.as_deref(), chrono::Utc::now().timestamp())
                .await
                .context("Failed to add item")?;
            println!("✅ Added '{}' for {}", item.name, item.price);
        }
        ItemSubcommand::Remove { name } => {
            economy.remove_item(name).await.context("Failed to remove item")?;
            println!("🗑️ Removed '{}'", name);
        }
        ItemSubcommand::Update {
            name,
            price,
            description,
        } => {
            let update = ItemUpdate {
                price: *price,
                description: description.clone(),
            };
            let item = economy
                .update_item(name, update)
                .await
                .context("Failed to update item")?;
            println!("✏️ '{}' now costs {}: {}", item.name, item.price, item.description);
        }
        ItemSubcommand::Toggle { name } => {
            let available = economy
                .toggle_item(name)
                .await
                .context("Failed to toggle item")?;
            println!(
                "🔄 '{}' is now {}",
                name,
                if available { "available" } else { "unavailable" }
            );
        }
        ItemSubcommand::List { available, json } => {
            let items = economy
                .list_items(*available)
                .await
                .context("Failed to list items")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&items).context("Failed to encode items")?
                );
            } else {
                print_items(&items);
            }
        }
    }
    Ok(())
}

fn print_items(items: &[MarketItem]) {
    if items.is_empty() {
        println!("📭 No items in marketplace yet");
        return;
    }
    println!("=== Marketplace Items ===\n");
    for item in items {
        let status = if item.available { "✅" } else { "❌" };
        println!("{} {} - {}", status, item.name, item.price);
        println!("    {}", item.description);
    }
}

fn print_sync_report(report: &SyncReport) {
    println!("=== Sync Report ===\n");
    println!(
        "{:<10} {:>8} {:>8} {:>8} {:>8}",
        "kind", "scanned", "synced", "deleted", "failed"
    );
    for batch in &report.batches {
        println!(
            "{:<10} {:>8} {:>8} {:>8} {:>8}",
            batch.kind.to_string(),
            batch.scanned,
            batch.synced,
            batch.deleted,
            batch.failures.len()
        );
        if let Some(reason) = &batch.aborted {
            println!("  ⚠️ aborted: {}", reason);
        }
        for failure in &batch.failures {
            println!("  ❌ {}: {}", failure.key, failure.reason);
        }
    }
    println!("\n✅ {} records synced", report.total_synced());
}

fn print_repair_report(report: &RepairReport) {
    println!("=== Expiry Repair Report ===\n");
    println!(
        "{:<10} {:>8} {:>8} {:>8} {:>8}",
        "kind", "scanned", "repaired", "healthy", "vanished"
    );
    for outcome in &report.outcomes {
        println!(
            "{:<10} {:>8} {:>8} {:>8} {:>8}",
            outcome.kind.to_string(),
            outcome.scanned,
            outcome.repaired,
            outcome.healthy,
            outcome.vanished
        );
        if let Some(reason) = &outcome.aborted {
            println!("  ⚠️ aborted: {}", reason);
        }
        for failure in &outcome.failures {
            println!("  ❌ {}: {}", failure.key, failure.reason);
        }
    }
    println!("\n✅ {} keys repaired", report.total_repaired());
}
