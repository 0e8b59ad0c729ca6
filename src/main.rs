//! # Sigwatch — Change Detection & Notification Service
//!
//! Polls configured sources (files, folders, SQL queries) on cron
//! schedules and fans findings out to subscribed Telegram chats.
//!
//! Usage:
//!   sigwatch                             # Start with ~/.sigwatch/config.toml
//!   sigwatch --config ./sigwatch.toml    # Explicit config file
//!   sigwatch --db ./sigwatch.db -v       # Custom database, debug logging

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sigwatch_core::SigwatchConfig;
use sigwatch_engine::{Engine, TelegramTransport};
use sigwatch_store::SqliteStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sigwatch",
    version,
    about = "📡 Sigwatch — change detection & notification service"
)]
struct Cli {
    /// Config file path (default: ~/.sigwatch/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (overrides the config file)
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "sigwatch=debug"
    } else {
        "sigwatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => SigwatchConfig::load_from(std::path::Path::new(&expand_path(path)))?,
        None => SigwatchConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }

    let db_path = expand_path(&config.db_path);
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = Arc::new(SqliteStore::open(std::path::Path::new(&db_path))?);

    let token = config.telegram.token();
    if token.is_empty() {
        tracing::warn!("⚠️ No Telegram bot token configured; deliveries will fail.");
        tracing::warn!("   Set SIGWATCH_TELEGRAM_TOKEN or telegram.bot_token in the config.");
    }
    let transport = Arc::new(TelegramTransport::new(&token));

    println!("📡 Sigwatch v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:  {db_path}");
    println!("   🌍 Timezone:  {}", config.timezone);
    println!("   ♻️  Actualize: {}", config.timeout.actualizer_cron);
    println!();

    let engine = Arc::new(Engine::new(config, storage, transport)?);
    let runner = tokio::spawn(Arc::clone(&engine).run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C");
    engine.shutdown().await;
    runner.await?;

    Ok(())
}
