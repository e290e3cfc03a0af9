use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default)]
    pub general: Option<GeneralConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Empty means every user may trigger plugins
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    /// Maximum concurrently running tasks per iteration pool
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Delay between two poll iterations
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: f64,
    /// Server-side getUpdates long-poll timeout
    #[serde(default)]
    pub long_poll_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub initial_offset: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GeneralConfig {
    /// Cron expression (with seconds) for the heartbeat log line
    #[serde(default)]
    pub heartbeat_cron: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            sleep_secs: default_sleep_secs(),
            long_poll_secs: 0,
            request_timeout_secs: default_request_timeout_secs(),
            initial_offset: 0,
        }
    }
}

impl PollerConfig {
    pub fn sleep(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs + self.long_poll_secs)
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_sleep_secs() -> f64 {
    1.0
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pollbot.db")
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        database_path: default_db_path(),
    }
}

fn default_heartbeat_cron() -> &'static str {
    "0 0 * * * *"
}

impl Config {
    /// Cron expression for the heartbeat job (from [general], hourly by default).
    pub fn heartbeat_cron(&self) -> &str {
        self.general
            .as_ref()
            .and_then(|g| g.heartbeat_cron.as_deref())
            .unwrap_or(default_heartbeat_cron())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if self.poller.workers == 0 {
            anyhow::bail!("poller.workers must be at least 1");
        }
        if !self.poller.sleep_secs.is_finite() || self.poller.sleep_secs < 0.0 {
            anyhow::bail!(
                "poller.sleep_secs must be a non-negative number, got {}",
                self.poller.sleep_secs
            );
        }
        Ok(())
    }
}
