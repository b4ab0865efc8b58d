//! Configuration management for the demo host.
//!
//! Loads the TOML configuration file, creating it with defaults on first
//! run, and validates it before anything is started.

use anyhow::Context;
use event_bus::BusConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Event bus settings
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub demo: DemoSettings,
}

/// Execution contexts the demo registers on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Name of the dedicated I/O scheduler thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Number of simulated rounds
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Chat messages containing any of these words are cancelled
    #[serde(default = "default_banned_words")]
    pub banned_words: Vec<String>,
}

fn default_thread_name() -> String {
    "event-io".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rounds() -> u32 {
    5
}

fn default_banned_words() -> Vec<String> {
    vec!["spam".to_string()]
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            banned_words: default_banned_words(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Checks the configuration for values the host cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.scheduler.thread_name.trim().is_empty() {
            return Err("Scheduler thread name cannot be empty".to_string());
        }

        if self.demo.rounds == 0 {
            return Err("Demo must run at least one round".to_string());
        }

        if self.demo.banned_words.iter().any(|word| word.is_empty()) {
            return Err("Banned words cannot be empty strings".to_string());
        }

        Ok(())
    }
}
