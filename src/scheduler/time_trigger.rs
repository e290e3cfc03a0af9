use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::platform::telegram::TelegramApi;
use crate::plugins::{PluginContext, PluginRegistry, Trigger};
use crate::storage::{FlaggedTimeRecord, Store};

/// Outcome counts of one time-trigger sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub executed: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Runs flagged time records whose due time has passed.
///
/// Only one sweep runs at a time, no matter how many poll iterations have
/// submitted one. A due record is deleted after its plugin invocation has
/// been attempted, whether or not that attempt succeeded.
pub struct TimeTrigger {
    lock: Mutex<()>,
    store: Store,
    plugins: Arc<PluginRegistry>,
    api: TelegramApi,
}

impl TimeTrigger {
    pub fn new(store: Store, plugins: Arc<PluginRegistry>, api: TelegramApi) -> Self {
        Self {
            lock: Mutex::new(()),
            store,
            plugins,
            api,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let _guard = self.lock.lock().await;

        let records = self.store.list_flagged_time().await?;
        let mut report = SweepReport::default();

        for record in records {
            if !record.is_due(Utc::now()) {
                report.pending += 1;
                continue;
            }

            match self.execute(&record).await {
                Ok(()) => {
                    info!(
                        "Time trigger ran plugin '{}' (record {})",
                        record.plugin_name, record.id
                    );
                    report.executed += 1;
                }
                Err(e) => {
                    error!(
                        "Time trigger for plugin '{}' (record {}, due {}) failed: {:#}",
                        record.plugin_name, record.id, record.due_at, e
                    );
                    report.failed += 1;
                }
            }

            match self.store.delete_flagged_time(record.id).await {
                Ok(true) => {}
                Ok(false) => warn!("Flagged time record {} was already removed", record.id),
                Err(e) => error!(
                    "Failed to delete flagged time record {}, it may run again: {:#}",
                    record.id, e
                ),
            }
        }

        if report.executed + report.failed > 0 {
            debug!("Time trigger sweep finished: {:?}", report);
        }
        Ok(report)
    }

    async fn execute(&self, record: &FlaggedTimeRecord) -> Result<()> {
        let plugin = self
            .plugins
            .get(&record.plugin_name)
            .with_context(|| format!("No plugin named '{}'", record.plugin_name))?;

        let plugin_data = record
            .plugin_data
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .context("Failed to decode plugin data")?;

        let ctx = PluginContext {
            api: self.api.clone(),
            store: self.store.clone(),
            plugin_name: record.plugin_name.clone(),
            plugin_data,
            trigger: Trigger::Timer,
        };

        match AssertUnwindSafe(plugin.main(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("plugin panicked"),
        }
    }
}
