mod bot;
mod config;
mod extensions;
mod platform;
mod plugins;
mod poller;
mod router;
mod scheduler;
mod storage;
#[cfg(test)]
mod test_utils;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::platform::telegram::{TelegramApi, TelegramSource};
use crate::poller::Poller;
use crate::scheduler::Scheduler;
use crate::storage::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pollbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  API: {}", config.telegram.api_url);
    info!("  Workers: {}", config.poller.workers);
    info!("  Sleep: {:?}", config.poller.sleep());
    info!("  Database: {}", config.storage.database_path.display());
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);

    let store = Store::open(&config.storage.database_path)?;
    let api = TelegramApi::new(&config.telegram)?;
    let source = TelegramSource::new(
        &config.telegram,
        config.poller.long_poll_secs,
        config.poller.request_timeout(),
    )?;

    let plugins = plugins::builtin_plugins();
    let extensions = extensions::builtin_extensions(store.clone())?;
    if plugins.is_empty() || extensions.is_empty() {
        warn!("Running without plugins or extensions");
    }
    info!(
        "Loaded {} plugin(s) and {} extension(s)",
        plugins.len(),
        extensions.len()
    );

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(
        &mut scheduler,
        store.clone(),
        config.heartbeat_cron(),
    )
    .await?;
    scheduler.start().await?;

    let state = Arc::new(AppState::new(config, api, store, plugins, extensions));
    let poller = Poller::new(Arc::new(source), state);

    info!("Bot is starting...");
    tokio::select! {
        _ = poller.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Ctrl-C received, stopping poller; in-flight tasks are abandoned");
        }
    }

    scheduler.shutdown().await?;
    Ok(())
}
