use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bot::AppState;
use crate::platform::telegram::UpdateSource;
use crate::platform::{Update, UpdatesResponse};
use crate::router::{route_update, Dispatched};
use crate::worker::WorkerPool;

/// Identifier of the next update not yet fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(i64);

impl Cursor {
    pub fn new(offset: i64) -> Self {
        Self(offset)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Move past every update in `batch`. Never moves backwards.
    pub fn advance_past(&mut self, batch: &[Update]) {
        if let Some(max_id) = batch.iter().map(|u| u.update_id).max() {
            let next = max_id.checked_add(1).unwrap_or_else(|| {
                warn!("Update id {} is at the offset limit, cursor saturates", max_id);
                i64::MAX
            });
            self.0 = self.0.max(next);
        }
    }
}

/// How a single poll iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Updates were fetched and dispatched
    Dispatched,
    /// The platform answered `ok` with nothing new
    Empty,
    /// The platform answered `ok: false`
    Rejected,
    /// The body could not be decoded
    Malformed,
    /// The request itself failed
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    pub outcome: Outcome,
    pub cursor: i64,
    pub handlers: usize,
    pub dropped: usize,
    pub extension_sweep: bool,
}

/// Drives fetch, fan-out and sleep forever
pub struct Poller {
    source: Arc<dyn UpdateSource>,
    state: Arc<AppState>,
    cursor: Cursor,
    workers: usize,
    sleep: Duration,
}

impl Poller {
    pub fn new(source: Arc<dyn UpdateSource>, state: Arc<AppState>) -> Self {
        let poller = &state.config.poller;
        let (cursor, workers, sleep) = (
            Cursor::new(poller.initial_offset),
            poller.workers,
            poller.sleep(),
        );
        Self {
            source,
            state,
            cursor,
            workers,
            sleep,
        }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor.get()
    }

    /// Poll until the process is stopped.
    pub async fn run(mut self) {
        info!(
            "Polling from offset {} with {} workers, sleeping {:?} between polls",
            self.cursor(),
            self.workers,
            self.sleep
        );
        loop {
            let report = self.poll_once().await;
            if report.outcome == Outcome::Dispatched {
                debug!(
                    "Dispatched {} handler(s), dropped {}, extension sweep: {}, next offset {}",
                    report.handlers, report.dropped, report.extension_sweep, report.cursor
                );
            }
            tokio::time::sleep(self.sleep).await;
        }
    }

    /// One fetch-and-dispatch iteration, without the trailing sleep.
    pub async fn poll_once(&mut self) -> IterationReport {
        self.iterate().await.0
    }

    /// Like `poll_once`, but also hands back the (already shut down) pool
    /// the iteration submitted its work to.
    pub(crate) async fn iterate(&mut self) -> (IterationReport, WorkerPool) {
        let fetched = self.source.fetch_updates(self.cursor.get()).await;

        let pool = WorkerPool::new(self.workers);
        let state = Arc::clone(&self.state);
        pool.submit("time_trigger", async move {
            state.time_trigger.sweep().await.map(|_| ())
        });

        let report = self.dispatch(fetched, &pool);
        pool.shutdown();
        (report, pool)
    }

    fn dispatch(&mut self, fetched: anyhow::Result<String>, pool: &WorkerPool) -> IterationReport {
        let mut report = IterationReport {
            outcome: Outcome::Empty,
            cursor: self.cursor.get(),
            handlers: 0,
            dropped: 0,
            extension_sweep: false,
        };

        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to fetch updates: {:#}", e);
                report.outcome = Outcome::Unreachable;
                return report;
            }
        };

        let response = match UpdatesResponse::parse(&body) {
            Ok(response) => response,
            Err(e) => {
                error!("Error parsing Telegram response: {}\nResponse: {}", e, body);
                report.outcome = Outcome::Malformed;
                return report;
            }
        };

        if !response.ok {
            warn!(
                "Response not OK (code {:?}): {}",
                response.error_code,
                response.description.as_deref().unwrap_or("no description")
            );
            report.outcome = Outcome::Rejected;
            return report;
        }
        if response.result.is_empty() {
            return report;
        }

        let batch = Arc::new(response.result);
        self.cursor.advance_past(&batch);
        debug!(
            "Fetched {} update(s), cursor now {}",
            batch.len(),
            self.cursor.get()
        );

        let (state, sweep_batch) = (Arc::clone(&self.state), Arc::clone(&batch));
        report.extension_sweep = pool.submit("extensions", async move {
            state.extensions.sweep(&sweep_batch).await;
            Ok(())
        });

        for update in batch.iter() {
            match route_update(pool, &self.state, update) {
                Dispatched::Dropped => report.dropped += 1,
                Dispatched::Message | Dispatched::CallbackQuery => report.handlers += 1,
            }
        }

        report.outcome = Outcome::Dispatched;
        report.cursor = self.cursor.get();
        report
    }
}
