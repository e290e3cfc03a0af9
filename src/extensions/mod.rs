pub mod activity;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::platform::Update;
use crate::storage::Store;

/// A stateful processor that sees every fetched batch of updates
#[async_trait]
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    fn initial_state(&self) -> Value {
        Value::Null
    }

    /// Process one batch and return the extension's next state.
    async fn process(&self, batch: &[Update], store: &Store, state: Value) -> Result<Value>;
}

/// Per-extension state slots; lives as long as the chain does
#[derive(Debug, Default)]
pub struct ExtensionState {
    slots: HashMap<String, Value>,
}

impl ExtensionState {
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Registered extensions in a fixed order, plus their shared state.
///
/// A sweep holds the state lock for its whole pass over the chain, so two
/// sweeps never interleave. An extension that fails keeps the state it had
/// before the sweep; the rest of the chain still runs.
pub struct ExtensionChain {
    extensions: Vec<Arc<dyn Extension>>,
    state: Mutex<ExtensionState>,
    store: Store,
}

impl ExtensionChain {
    pub fn new(store: Store) -> Self {
        Self {
            extensions: Vec::new(),
            state: Mutex::new(ExtensionState::default()),
            store,
        }
    }

    /// Append an extension to the end of the chain.
    pub fn register(&mut self, extension: Arc<dyn Extension>) -> Result<()> {
        let name = extension.name().to_string();
        let slots = &mut self.state.get_mut().slots;
        if slots.contains_key(&name) {
            anyhow::bail!("Extension '{}' is already registered", name);
        }
        slots.insert(name.clone(), extension.initial_state());
        self.extensions.push(extension);
        info!("Registered extension: {}", name);
        Ok(())
    }

    pub async fn sweep(&self, batch: &[Update]) -> ChainReport {
        let mut state = self.state.lock().await;
        let mut report = ChainReport::default();

        for extension in &self.extensions {
            let name = extension.name();
            let current = state.slots.get(name).cloned().unwrap_or(Value::Null);

            let outcome = AssertUnwindSafe(extension.process(batch, &self.store, current))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(next)) => {
                    state.slots.insert(name.to_string(), next);
                    report.succeeded += 1;
                }
                Ok(Err(e)) => {
                    error!("Extension '{}' failed, keeping previous state: {:#}", name, e);
                    report.failed += 1;
                }
                Err(_) => {
                    error!("Extension '{}' panicked, keeping previous state", name);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Extension sweep over {} update(s): {:?}",
            batch.len(),
            report
        );
        report
    }

    /// Snapshot of one extension's state
    #[cfg(test)]
    pub async fn state_of(&self, name: &str) -> Option<Value> {
        self.state.lock().await.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Chain with the extensions shipped in this crate
pub fn builtin_extensions(store: Store) -> Result<ExtensionChain> {
    let mut chain = ExtensionChain::new(store);
    chain.register(Arc::new(activity::Activity))?;
    Ok(chain)
}
