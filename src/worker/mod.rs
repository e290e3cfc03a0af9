use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Bounded-concurrency, fire-and-forget task pool.
///
/// `submit` never waits: every accepted task is spawned immediately and
/// queues on a semaphore until one of the `workers` permits frees up.
/// Errors and panics are logged per task and never reach the submitter
/// or sibling tasks.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            closed: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Queue a named task. Returns false if the pool no longer accepts work.
    pub fn submit<F>(&self, name: impl Into<String>, task: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        if self.is_shut_down() {
            warn!("Worker pool is shut down, dropping task '{}'", name);
            return false;
        }

        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            // The semaphore is never closed; acquire cannot fail in practice
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("Worker pool closed before task '{}' started", name);
                return;
            };
            debug!("Task '{}' started", name);
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!("Task '{}' finished", name),
                Ok(Err(e)) => error!("Task '{}' failed: {:#}", name, e),
                Err(panic) => error!("Task '{}' panicked: {}", name, panic_message(&*panic)),
            }
        });

        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
        true
    }

    /// Stop accepting new tasks. Already submitted tasks keep running.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait for every submitted task to finish.
    #[cfg(test)]
    pub async fn join(&self) {
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
