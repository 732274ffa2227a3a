// src/notify/kakao.rs
//! Plain text webhook (`{text, username}`), as accepted by KakaoWork-style bots.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;

use super::format::{render_text, Digest};
use super::Channel;

pub struct KakaoChannel {
    webhook_url: String,
    client: Client,
}

impl KakaoChannel {
    pub fn new(url: String, client: Client) -> Self {
        Self {
            webhook_url: url,
            client,
        }
    }
}

#[derive(Serialize)]
struct TextPayload<'a> {
    text: String,
    username: &'a str,
}

#[async_trait::async_trait]
impl Channel for KakaoChannel {
    fn name(&self) -> &str {
        "kakao"
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let payload = TextPayload {
            text: render_text(digest),
            username: &digest.settings.bot_name,
        };
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("kakao post")?
            .error_for_status()
            .context("kakao non-2xx")?;
        Ok(())
    }
}
