use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use super::{Plugin, PluginContext, Trigger};

const USAGE: &str = "Usage: /remind <seconds> <text>";

/// `/remind <seconds> <text>`: echoes the text back after a delay, through a
/// flagged time record.
pub struct Remind;

/// Parse `<seconds> <text>` into a delay and reminder text.
fn parse_request(args: &str) -> Result<(Duration, String)> {
    let (secs, text) = args
        .trim()
        .split_once(char::is_whitespace)
        .context(USAGE)?;
    let secs: i64 = secs.parse().context(USAGE)?;
    if secs <= 0 {
        anyhow::bail!("Delay must be a positive number of seconds");
    }
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!(USAGE);
    }
    let delay = Duration::try_seconds(secs).context("Delay is too large")?;
    Ok((delay, text.to_string()))
}

/// Flag the reminder and return when it will fire.
async fn schedule(ctx: &PluginContext, args: &str) -> Result<DateTime<Utc>> {
    let chat_id = ctx.chat_id().context("Reminder needs a chat")?;
    let (delay, text) = parse_request(args)?;
    let due_at = Utc::now()
        .checked_add_signed(delay)
        .context("Delay is too large")?;
    let id = ctx
        .flag_time(due_at, Some(&json!({ "chat_id": chat_id, "text": text })))
        .await?;
    info!("Reminder {} for chat {} due at {}", id, chat_id, due_at);
    Ok(due_at)
}

#[async_trait]
impl Plugin for Remind {
    fn name(&self) -> &str {
        "remind"
    }

    async fn main(&self, ctx: PluginContext) -> Result<()> {
        match &ctx.trigger {
            Trigger::Message { args, .. } => match schedule(&ctx, args).await {
                Ok(due_at) => {
                    let when = due_at.format("%Y-%m-%d %H:%M:%S UTC");
                    ctx.reply(&format!("Reminder set for {}", when)).await
                }
                Err(e) => ctx.reply(&e.to_string()).await,
            },
            Trigger::Timer => {
                let text = ctx
                    .plugin_data
                    .as_ref()
                    .and_then(|d| d.get("text"))
                    .and_then(|v| v.as_str())
                    .context("Reminder record has no text")?;
                ctx.reply(&format!("Reminder: {}", text)).await
            }
            Trigger::CallbackQuery { payload, .. } => {
                // "<seconds> <text>" buttons re-arm a reminder
                schedule(&ctx, payload).await.map(|_| ())
            }
        }
    }
}
