pub mod telegram;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub chat_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Split `/cmd@bot args` into (`cmd`, `args`). None for plain text.
    pub fn command(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref()?.trim_start();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        let command = head.split('@').next().unwrap_or(head);
        if command.is_empty() {
            return None;
        }
        Some((command, args))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Callback data is addressed as `<plugin>:<payload>`.
    pub fn target(&self) -> Option<(&str, &str)> {
        let data = self.data.as_deref()?;
        match data.split_once(':') {
            Some((plugin, payload)) if !plugin.is_empty() => Some((plugin, payload)),
            Some(_) => None,
            None if !data.is_empty() => Some((data, "")),
            None => None,
        }
    }
}

/// One event delivered by getUpdates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
    /// Update kinds this bot does not handle (edited_message, poll, ...)
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Which handling path an update takes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    Message(&'a Message),
    CallbackQuery(&'a CallbackQuery),
    /// Carries the first payload key seen, if any
    Unclassified(Option<&'a str>),
}

impl Update {
    pub fn route(&self) -> Route<'_> {
        if let Some(message) = &self.message {
            Route::Message(message)
        } else if let Some(query) = &self.callback_query {
            Route::CallbackQuery(query)
        } else {
            Route::Unclassified(self.other.keys().next().map(String::as_str))
        }
    }
}

/// Body of a getUpdates response
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatesResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Vec<Update>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl UpdatesResponse {
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}
