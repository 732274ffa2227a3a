use anyhow::Result;

use super::format::{render_text, Digest};
use super::Channel;

/// Writes the digest to the log. Enabled with `NOTIFY_CONSOLE=1` for local runs.
pub struct ConsoleChannel;

#[async_trait::async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        tracing::info!(target: "notify", "\n{}", render_text(digest));
        Ok(())
    }
}
