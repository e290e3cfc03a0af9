use anyhow::Result;
use async_trait::async_trait;

use super::{Plugin, PluginContext};

/// `/ping` liveness check
pub struct Ping;

#[async_trait]
impl Plugin for Ping {
    fn name(&self) -> &str {
        "ping"
    }

    async fn main(&self, ctx: PluginContext) -> Result<()> {
        ctx.reply("pong").await
    }
}
