pub mod ping;
pub mod remind;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::platform::telegram::TelegramApi;
use crate::platform::{CallbackQuery, Message};
use crate::storage::Store;

/// What caused a plugin to run
#[derive(Debug, Clone)]
pub enum Trigger {
    /// A `/command` message; `args` is the text after the command
    Message { message: Message, args: String },
    /// Callback data addressed to this plugin; `payload` is the part after `plugin:`
    CallbackQuery { query: CallbackQuery, payload: String },
    /// A flagged time record came due
    Timer,
}

/// Everything a plugin invocation gets to work with
#[derive(Clone)]
pub struct PluginContext {
    pub api: TelegramApi,
    pub store: Store,
    pub plugin_name: String,
    /// Decoded `plugin_data` of the flagged record, for timer runs
    pub plugin_data: Option<serde_json::Value>,
    pub trigger: Trigger,
}

impl PluginContext {
    /// Chat this invocation belongs to, if it can be determined
    pub fn chat_id(&self) -> Option<i64> {
        match &self.trigger {
            Trigger::Message { message, .. } => Some(message.chat.id),
            Trigger::CallbackQuery { query, .. } => {
                query.message.as_ref().map(|m| m.chat.id)
            }
            Trigger::Timer => self
                .plugin_data
                .as_ref()
                .and_then(|d| d.get("chat_id"))
                .and_then(|v| v.as_i64()),
        }
    }

    pub async fn reply(&self, text: &str) -> Result<()> {
        let chat_id = self
            .chat_id()
            .with_context(|| format!("Plugin '{}' has no chat to reply to", self.plugin_name))?;
        self.api.send_text(chat_id, text).await
    }

    /// Ask for this plugin to be run again once `due_at` has passed.
    pub async fn flag_time(
        &self,
        due_at: DateTime<Utc>,
        data: Option<&serde_json::Value>,
    ) -> Result<i64> {
        self.store.flag_time(&self.plugin_name, due_at, data).await
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Slash commands (without `/`) routed to this plugin
    fn commands(&self) -> Vec<String> {
        vec![self.name().to_string()]
    }

    async fn main(&self, ctx: PluginContext) -> Result<()>;
}

/// Registry of all loaded plugins
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    commands: HashMap<String, String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. A later plugin claiming the same command wins.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        for command in plugin.commands() {
            self.commands.insert(command, name.clone());
        }
        info!("Registered plugin: {}", name);
        self.plugins.insert(name, plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn by_command(&self, command: &str) -> Option<Arc<dyn Plugin>> {
        self.commands.get(command).and_then(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Registry with the plugins shipped in this crate
pub fn builtin_plugins() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(ping::Ping));
    registry.register(Arc::new(remind::Remind));
    registry
}
