use std::sync::Arc;

use crate::config::Config;
use crate::extensions::ExtensionChain;
use crate::platform::telegram::TelegramApi;
use crate::plugins::PluginRegistry;
use crate::scheduler::time_trigger::TimeTrigger;
use crate::storage::Store;

/// Shared application state, handed to every worker task
pub struct AppState {
    pub config: Config,
    pub api: TelegramApi,
    pub store: Store,
    pub plugins: Arc<PluginRegistry>,
    pub time_trigger: TimeTrigger,
    pub extensions: ExtensionChain,
}

impl AppState {
    pub fn new(
        config: Config,
        api: TelegramApi,
        store: Store,
        plugins: PluginRegistry,
        extensions: ExtensionChain,
    ) -> Self {
        let plugins = Arc::new(plugins);
        let time_trigger = TimeTrigger::new(store.clone(), plugins.clone(), api.clone());
        Self {
            config,
            api,
            store,
            plugins,
            time_trigger,
            extensions,
        }
    }

    /// Whether `user_id` may trigger plugins. An empty allow-list admits everyone.
    pub fn is_allowed(&self, user_id: i64) -> bool {
        let allowed = &self.config.telegram.allowed_user_ids;
        allowed.is_empty() || allowed.contains(&user_id)
    }
}
