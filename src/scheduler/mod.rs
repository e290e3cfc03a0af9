pub mod tasks;
pub mod time_trigger;

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

/// Boxed future produced by a housekeeping job on each tick
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cron-driven housekeeping that runs beside the poll loop.
///
/// Time-triggered plugin records are not scheduled here; they ride on the
/// poll loop's per-iteration sweep (see [`time_trigger`]).
pub struct Scheduler {
    inner: JobScheduler,
    jobs: usize,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner, jobs: 0 })
    }

    /// Run `task` on every tick of `cron_expr` (six fields, seconds first).
    pub async fn add_cron_job<F>(&mut self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            debug!("Housekeeping job '{}' fired", job_name);
            task()
        })
        .with_context(|| format!("Invalid cron expression for job '{}': {}", name, cron_expr))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;
        self.jobs += 1;

        info!("Scheduled job '{}' with cron: {}", name, cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started with {} job(s)", self.jobs);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
