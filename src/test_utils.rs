//! Fakes and fixtures shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bot::AppState;
use crate::config::Config;
use crate::extensions::{Extension, ExtensionChain};
use crate::platform::telegram::{TelegramApi, UpdateSource};
use crate::platform::Update;
use crate::plugins::{Plugin, PluginContext, PluginRegistry, Trigger};
use crate::storage::Store;

/// Points at a closed local port so nothing ever leaves the machine.
pub fn test_config() -> Config {
    Config::parse(
        r#"
        [telegram]
        bot_token = "123:test"
        api_url = "http://127.0.0.1:9"

        [poller]
        workers = 4
        sleep_secs = 0.0
        "#,
    )
    .unwrap()
}

pub fn test_api() -> TelegramApi {
    TelegramApi::new(&test_config().telegram).unwrap()
}

pub fn test_state(
    plugins: Vec<Arc<ProbePlugin>>,
    extensions: Vec<Arc<ProbeExtension>>,
) -> Arc<AppState> {
    test_state_with(test_config(), plugins, extensions)
}

pub fn test_state_with(
    config: Config,
    plugins: Vec<Arc<ProbePlugin>>,
    extensions: Vec<Arc<ProbeExtension>>,
) -> Arc<AppState> {
    let store = Store::open_in_memory().unwrap();
    let api = TelegramApi::new(&config.telegram).unwrap();

    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        registry.register(plugin);
    }
    let mut chain = ExtensionChain::new(store.clone());
    for extension in extensions {
        chain.register(extension).unwrap();
    }
    Arc::new(AppState::new(config, api, store, registry, chain))
}

/// A message from user 5 in `chat_id`
pub fn message_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "from": {"id": 5, "first_name": "Ann"},
            "chat": {"id": chat_id, "type": "private"},
            "date": 0,
            "text": text,
        }
    }))
    .unwrap()
}

/// A button press from user 5 with no attached message
pub fn callback_update(update_id: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb{}", update_id),
            "from": {"id": 5, "first_name": "Ann"},
            "data": data,
        }
    }))
    .unwrap()
}

/// Replays canned getUpdates results and records requested offsets
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<String>>>,
    offsets: Mutex<Vec<i64>>,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            offsets: Mutex::new(Vec::new()),
        }
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch_updates(&self, offset: i64) -> Result<String> {
        self.offsets.lock().unwrap().push(offset);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
    }
}

enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Sleep(u64),
}

/// Plugin that records how it was called
pub struct ProbePlugin {
    name: String,
    behaviour: Behaviour,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    args: Mutex<Vec<String>>,
    data: Mutex<Vec<Option<Value>>>,
    records_seen: Mutex<Vec<usize>>,
}

impl ProbePlugin {
    fn with(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            args: Mutex::new(Vec::new()),
            data: Mutex::new(Vec::new()),
            records_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn new(name: &str) -> Self {
        Self::with(name, Behaviour::Succeed)
    }

    pub fn failing(name: &str) -> Self {
        Self::with(name, Behaviour::Fail)
    }

    pub fn panicking(name: &str) -> Self {
        Self::with(name, Behaviour::Panic)
    }

    pub fn slow(name: &str, millis: u64) -> Self {
        Self::with(name, Behaviour::Sleep(millis))
    }

    /// Command args or callback payloads, in call order
    pub fn seen_args(&self) -> Vec<String> {
        self.args.lock().unwrap().clone()
    }

    /// Decoded plugin data of timer calls, in call order
    pub fn seen_data(&self) -> Vec<Option<Value>> {
        self.data.lock().unwrap().clone()
    }

    /// Flagged records under this plugin's name that existed during each timer call
    pub fn records_seen_during_call(&self) -> Vec<usize> {
        self.records_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for ProbePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn main(&self, ctx: PluginContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        match &ctx.trigger {
            Trigger::Message { args, .. } => {
                self.args.lock().unwrap().push(args.clone());
            }
            Trigger::CallbackQuery { payload, .. } => {
                self.args.lock().unwrap().push(payload.clone());
            }
            Trigger::Timer => {
                self.data.lock().unwrap().push(ctx.plugin_data.clone());
                let mine = ctx
                    .store
                    .list_flagged_time()
                    .await?
                    .iter()
                    .filter(|r| r.plugin_name == self.name)
                    .count();
                self.records_seen.lock().unwrap().push(mine);
            }
        }

        let result = match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(anyhow::anyhow!("probe '{}' failed", self.name)),
            Behaviour::Panic => panic!("probe '{}' panicked", self.name),
            Behaviour::Sleep(millis) => {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(())
            }
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Extension whose state is the number of updates it has processed
pub struct ProbeExtension {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    panics: bool,
    delay_ms: u64,
    pub fail_next: AtomicBool,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    batches: Mutex<Vec<usize>>,
}

impl ProbeExtension {
    pub fn shared_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn with(name: &str, log: Arc<Mutex<Vec<String>>>, panics: bool, delay_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            log,
            panics,
            delay_ms,
            fail_next: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self::with(name, log, false, 0)
    }

    pub fn panicking(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self::with(name, log, true, 0)
    }

    pub fn slow(name: &str, log: Arc<Mutex<Vec<String>>>, delay_ms: u64) -> Self {
        Self::with(name, log, false, delay_ms)
    }

    /// Size of every batch processed, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extension for ProbeExtension {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, batch: &[Update], _store: &Store, state: Value) -> Result<Value> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.name.clone());
        self.batches.lock().unwrap().push(batch.len());

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panics {
            panic!("extension '{}' panicked", self.name);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("extension '{}' failed", self.name);
        }
        let seen = state.as_u64().unwrap_or(0) + batch.len() as u64;
        Ok(json!(seen))
    }
}
