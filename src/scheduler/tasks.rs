use tracing::{info, warn};

use crate::scheduler::Scheduler;
use crate::storage::Store;

/// Register built-in background tasks
pub async fn register_builtin_tasks(
    scheduler: &mut Scheduler,
    store: Store,
    heartbeat_cron: &str,
) -> anyhow::Result<()> {
    // Heartbeat: log that the poller is alive and how much deferred work waits
    scheduler
        .add_cron_job(heartbeat_cron, "heartbeat", move || {
            let store = store.clone();
            Box::pin(async move {
                match store.count_flagged_time().await {
                    Ok(pending) => info!(
                        "Heartbeat: poller is alive, {} flagged time record(s) pending",
                        pending
                    ),
                    Err(e) => warn!("Heartbeat: failed to count flagged time records: {:#}", e),
                }
            })
        })
        .await?;

    Ok(())
}
