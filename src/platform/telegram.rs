use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::debug;

use crate::config::TelegramConfig;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Where the poll loop gets its raw getUpdates bodies from
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with identifier >= `offset`. Returns the unparsed body;
    /// only transport failures are errors here.
    async fn fetch_updates(&self, offset: i64) -> Result<String>;
}

/// getUpdates over HTTPS
pub struct TelegramSource {
    client: reqwest::Client,
    endpoint: String,
    long_poll_secs: u64,
}

impl TelegramSource {
    pub fn new(config: &TelegramConfig, long_poll_secs: u64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/getUpdates",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            long_poll_secs,
        })
    }
}

#[async_trait]
impl UpdateSource for TelegramSource {
    async fn fetch_updates(&self, offset: i64) -> Result<String> {
        debug!("Fetching updates from offset {}", offset);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.long_poll_secs.to_string()),
            ])
            .send()
            .await
            .context("Failed to send getUpdates request")?;

        // Error statuses still carry an {"ok": false, ...} body worth logging
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read getUpdates body (status {})", status))?;
        Ok(body)
    }
}

/// Outbound API session shared by handlers and plugins
#[derive(Clone)]
pub struct TelegramApi {
    bot: Bot,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let url = reqwest::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid telegram.api_url: {}", config.api_url))?;
        Ok(Self {
            bot: Bot::new(&config.bot_token).set_api_url(url),
        })
    }

    /// Send `text` to a chat, splitting it into several messages when needed.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, 4000) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        }
        Ok(())
    }
}
