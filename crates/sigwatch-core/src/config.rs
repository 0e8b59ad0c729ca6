//! Sigwatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SigwatchError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigwatchConfig {
    /// IANA timezone name the cron schedules are evaluated in.
    /// Falls back to UTC (with a warning) when the name is unknown.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_db_path() -> String {
    "~/.sigwatch/sigwatch.db".into()
}

impl Default for SigwatchConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            db_path: default_db_path(),
            timeout: TimeoutConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl SigwatchConfig {
    /// Load config from the default path (~/.sigwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SigwatchError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SigwatchError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SigwatchError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the sigwatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sigwatch")
    }
}

/// Timeout and scheduling budgets, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Overall wait budget for a fan-out batch and for force-check
    /// completion polling.
    #[serde(default = "default_common")]
    pub common: u64,
    /// Delay between a shutdown request and the engine actually stopping.
    #[serde(default = "default_close")]
    pub close: u64,
    /// Cron expression driving reconciliation passes.
    #[serde(default = "default_actualizer_cron")]
    pub actualizer_cron: String,
    /// Re-arm delay after a failed reconciliation pass, and the pause
    /// between delivery retry attempts.
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    /// Per-segment delivery lifetime budget.
    #[serde(default = "default_lifetime")]
    pub lifetime: u64,
}

fn default_common() -> u64 {
    300
}
fn default_close() -> u64 {
    5
}
fn default_actualizer_cron() -> String {
    "0 4 * * *".into()
}
fn default_retry_interval() -> u64 {
    15
}
fn default_lifetime() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            common: default_common(),
            close: default_close(),
            actualizer_cron: default_actualizer_cron(),
            retry_interval: default_retry_interval(),
            lifetime: default_lifetime(),
        }
    }
}

/// Telegram Bot API transport configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; the SIGWATCH_TELEGRAM_TOKEN env var overrides it.
    #[serde(default)]
    pub bot_token: String,
}

impl TelegramConfig {
    /// Resolve the bot token, preferring the environment.
    pub fn token(&self) -> String {
        std::env::var("SIGWATCH_TELEGRAM_TOKEN").unwrap_or_else(|_| self.bot_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SigwatchConfig::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.timeout.common, 300);
        assert_eq!(config.timeout.retry_interval, 15);
        assert_eq!(config.timeout.lifetime, 30);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: SigwatchConfig =
            toml::from_str("timezone = \"Europe/Berlin\"\n[timeout]\ncommon = 60\n").unwrap();
        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.timeout.common, 60);
        assert_eq!(config.timeout.close, 5);
        assert_eq!(config.timeout.actualizer_cron, "0 4 * * *");
    }
}
