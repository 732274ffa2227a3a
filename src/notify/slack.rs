use anyhow::{Context, Result};
use reqwest::Client;

use super::format::{slack_blocks, Digest};
use super::Channel;

pub struct SlackChannel {
    webhook_url: String,
    client: Client,
}

impl SlackChannel {
    pub fn new(url: String, client: Client) -> Self {
        Self {
            webhook_url: url,
            client,
        }
    }
}

#[async_trait::async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let body = slack_blocks(digest);

        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}
