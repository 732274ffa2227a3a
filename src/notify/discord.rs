use super::format::{render_text, Digest};
use super::Channel;
use crate::ingest::providers::truncate_description;
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Discord rejects `content` longer than this.
const DISCORD_CONTENT_LIMIT: usize = 2000;

#[derive(Clone)]
pub struct DiscordChannel {
    webhook: String,
    client: Client,
    timeout: Duration,
    /// Total attempts, including the first.
    max_retries: u8,
}

impl DiscordChannel {
    pub fn new(webhook: String, client: Client) -> Self {
        Self {
            webhook,
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: String,
    username: String,
}

impl DiscordWebhookPayload {
    fn from_digest(d: &Digest) -> Self {
        Self {
            // leave room for the "..." suffix
            content: truncate_description(&render_text(d), DISCORD_CONTENT_LIMIT - 3),
            username: d.settings.bot_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let payload = DiscordWebhookPayload::from_digest(digest);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}
