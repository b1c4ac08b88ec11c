//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::manager::EngagementCache;
use crate::telemetry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "xpsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        default_value = "xpsync.toml",
        help = "Path to the configuration file"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "run", about = "Run periodic sync and expiry repair until Ctrl-C")]
    Run,

    #[command(name = "status", about = "Show store health, sync phases and profiles")]
    Status(StatusArgs),

    #[command(name = "admin", about = "Admin operations (sync, cleanup, marketplace items)")]
    Admin(AdminArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Show the cached profile of this user")]
    pub user: Option<u64>,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod admin;
mod run;
mod status;

pub use admin::{AdminArgs, AdminSubcommand, ItemArgs, ItemSubcommand, ReportArgs};

/// 读取配置文件，附带路径上下文
pub fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    telemetry::init_tracing(&config.global.service_name, &config.global.log_filter)
        .context("Failed to initialize tracing")?;

    let cache = EngagementCache::connect(config)
        .await
        .context("Failed to connect to the configured stores")?;

    let result = match &cli.command {
        Commands::Run => run::execute(&cache).await,
        Commands::Status(args) => status::execute(&cache, args).await,
        Commands::Admin(args) => admin::execute(&cache, args).await,
    };
    telemetry::shutdown_tracing();
    result
}
