//! Event bus demo host
//!
//! Loads configuration, sets up logging, runs a simulated game session whose
//! handlers are spread across several execution contexts, and prints the
//! resulting report as JSON.

mod cli;
mod config;
mod demo;
mod logging;

use anyhow::Context;
use cli::CliArgs;
use config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Load configuration first (before logging setup)
    let mut config = AppConfig::load_from_file(&args.config_path).await?;

    // Apply CLI overrides
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(rounds) = args.rounds {
        config.demo.rounds = rounds;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    logging::setup_logging(&config.logging)?;
    info!("🚀 Starting event bus demo v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config_path.display());

    let runtime = tokio::runtime::Handle::current();
    let report = tokio::task::spawn_blocking(move || demo::run(&config, runtime))
        .await
        .context("Demo session panicked")??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
