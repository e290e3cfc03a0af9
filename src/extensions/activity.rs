use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Extension;
use crate::platform::{Route, Update};
use crate::storage::Store;

/// Counts messages and button presses per chat
pub struct Activity;

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct ActivityState {
    messages: u64,
    callbacks: u64,
    per_chat: BTreeMap<i64, u64>,
}

#[async_trait]
impl Extension for Activity {
    fn name(&self) -> &str {
        "activity"
    }

    fn initial_state(&self) -> Value {
        serde_json::to_value(ActivityState::default()).unwrap_or(Value::Null)
    }

    async fn process(&self, batch: &[Update], _store: &Store, state: Value) -> Result<Value> {
        let mut activity: ActivityState = if state.is_null() {
            ActivityState::default()
        } else {
            serde_json::from_value(state).context("Corrupt activity state")?
        };

        for update in batch {
            let chat_id = match update.route() {
                Route::Message(message) => {
                    activity.messages += 1;
                    Some(message.chat.id)
                }
                Route::CallbackQuery(query) => {
                    activity.callbacks += 1;
                    query.message.as_ref().map(|m| m.chat.id)
                }
                Route::Unclassified(_) => None,
            };
            if let Some(chat_id) = chat_id {
                *activity.per_chat.entry(chat_id).or_default() += 1;
            }
        }

        serde_json::to_value(&activity).context("Failed to encode activity state")
    }
}
