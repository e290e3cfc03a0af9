use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::bot::AppState;
use crate::platform::{CallbackQuery, Message, Route, Update};
use crate::plugins::{PluginContext, Trigger};
use crate::worker::WorkerPool;

/// Which handling path an update was sent down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Message,
    CallbackQuery,
    Dropped,
}

/// Classify one update and submit exactly one handler task for it.
pub fn route_update(pool: &WorkerPool, state: &Arc<AppState>, update: &Update) -> Dispatched {
    match update.route() {
        Route::Message(message) => {
            let (state, message) = (Arc::clone(state), message.clone());
            pool.submit(
                format!("message:{}", update.update_id),
                handle_message(state, message),
            );
            Dispatched::Message
        }
        Route::CallbackQuery(query) => {
            let (state, query) = (Arc::clone(state), query.clone());
            pool.submit(
                format!("callback_query:{}", update.update_id),
                handle_callback_query(state, query),
            );
            Dispatched::CallbackQuery
        }
        Route::Unclassified(kind) => {
            warn!(
                "Dropping unclassified update {} (kind: {})",
                update.update_id,
                kind.unwrap_or("none")
            );
            Dispatched::Dropped
        }
    }
}

async fn handle_message(state: Arc<AppState>, message: Message) -> Result<()> {
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };
    if !state.is_allowed(user.id) {
        debug!("Ignoring message from user {} (not allowed)", user.id);
        return Ok(());
    }

    let Some((command, args)) = message.command() else {
        return Ok(());
    };
    let Some(plugin) = state.plugins.by_command(command) else {
        debug!("No plugin handles /{}", command);
        return Ok(());
    };

    info!(
        "/{} from {} ({}) in chat {}",
        command, user.first_name, user.id, message.chat.id
    );

    let ctx = PluginContext {
        api: state.api.clone(),
        store: state.store.clone(),
        plugin_name: plugin.name().to_string(),
        plugin_data: None,
        trigger: Trigger::Message {
            args: args.to_string(),
            message: message.clone(),
        },
    };
    plugin
        .main(ctx)
        .await
        .with_context(|| format!("Plugin '{}' failed on /{}", plugin.name(), command))
}

async fn handle_callback_query(state: Arc<AppState>, query: CallbackQuery) -> Result<()> {
    if !state.is_allowed(query.from.id) {
        debug!("Ignoring callback from user {} (not allowed)", query.from.id);
        return Ok(());
    }

    let Some((target, payload)) = query.target() else {
        debug!("Callback query {} carries no plugin target", query.id);
        return Ok(());
    };
    let Some(plugin) = state.plugins.get(target) else {
        debug!("No plugin named '{}' for callback {}", target, query.id);
        return Ok(());
    };

    let ctx = PluginContext {
        api: state.api.clone(),
        store: state.store.clone(),
        plugin_name: plugin.name().to_string(),
        plugin_data: None,
        trigger: Trigger::CallbackQuery {
            payload: payload.to_string(),
            query: query.clone(),
        },
    };
    plugin
        .main(ctx)
        .await
        .with_context(|| format!("Plugin '{}' failed on callback {}", plugin.name(), query.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        callback_update, message_update, test_config, test_state, test_state_with, ProbePlugin,
    };
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_message_command_reaches_plugin() {
        let probe = Arc::new(ProbePlugin::new("probe"));
        let state = test_state(vec![probe.clone()], Vec::new());
        let pool = WorkerPool::new(2);

        let update = message_update(1, 55, "/probe hello world");
        assert_eq!(route_update(&pool, &state, &update), Dispatched::Message);
        pool.join().await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.seen_args(), vec!["hello world".to_string()]);
    }

    #[tokio::test]
    async fn test_plain_text_and_unknown_commands_are_ignored() {
        let probe = Arc::new(ProbePlugin::new("probe"));
        let state = test_state(vec![probe.clone()], Vec::new());
        let pool = WorkerPool::new(2);

        route_update(&pool, &state, &message_update(1, 55, "just chatting"));
        route_update(&pool, &state, &message_update(2, 55, "/nothing"));
        pool.join().await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_reaches_addressed_plugin() {
        let probe = Arc::new(ProbePlugin::new("probe"));
        let state = test_state(vec![probe.clone()], Vec::new());
        let pool = WorkerPool::new(2);

        let update = callback_update(7, "probe:again");
        assert_eq!(route_update(&pool, &state, &update), Dispatched::CallbackQuery);
        pool.join().await;

        assert_eq!(probe.seen_args(), vec!["again".to_string()]);
    }

    #[tokio::test]
    async fn test_unclassified_update_submits_nothing() {
        let probe = Arc::new(ProbePlugin::new("probe"));
        let state = test_state(vec![probe.clone()], Vec::new());
        let pool = WorkerPool::new(2);

        let update: Update =
            serde_json::from_value(json!({"update_id": 3, "poll": {"id": "p"}})).unwrap();
        assert_eq!(route_update(&pool, &state, &update), Dispatched::Dropped);
        pool.join().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allow_list_blocks_other_users() {
        let probe = Arc::new(ProbePlugin::new("probe"));
        let mut config = test_config();
        config.telegram.allowed_user_ids = vec![1];
        let state = test_state_with(config, vec![probe.clone()], Vec::new());
        assert!(state.is_allowed(1));
        assert!(!state.is_allowed(12345));

        let pool = WorkerPool::new(1);
        // message_update always sends as user 5
        route_update(&pool, &state, &message_update(1, 55, "/probe"));
        route_update(&pool, &state, &callback_update(2, "probe:x"));
        pool.join().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
