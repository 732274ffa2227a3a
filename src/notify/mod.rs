// src/notify/mod.rs
//! Delivery of new items to the configured channels.
//!
//! Every channel gets the same [`Digest`]; dispatch is concurrent and one
//! channel failing never prevents the others from being attempted.

pub mod console;
pub mod discord;
pub mod email;
pub mod format;
pub mod kakao;
pub mod slack;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinSet;

pub use format::{Digest, FormatSettings};

use crate::ingest::types::Item;

/// A single delivery target.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, digest: &Digest) -> Result<()>;
}

/// Result of one channel for one send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    pub channel: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelOutcome {
    fn ok(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            success: true,
            error: None,
        }
    }

    fn failed(channel: &str, error: String) -> Self {
        Self {
            channel: channel.to_string(),
            success: false,
            error: Some(error),
        }
    }
}

/// True when at least one channel accepted the message.
pub fn any_delivered(outcomes: &[ChannelOutcome]) -> bool {
    outcomes.iter().any(|o| o.success)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
}

/// Which channels are enabled. Read from the environment so secrets stay out of config files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelConfig {
    pub discord_webhook: Option<String>,
    pub slack_webhook: Option<String>,
    pub kakao_webhook: Option<String>,
    pub email: Option<EmailSettings>,
    pub console: bool,
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        let email = match (
            non_empty_env("SMTP_HOST"),
            non_empty_env("NOTIFY_EMAIL_FROM"),
            non_empty_env("NOTIFY_EMAIL_TO"),
        ) {
            (Some(host), Some(from), Some(to)) => Some(EmailSettings {
                host,
                user: non_empty_env("SMTP_USER").unwrap_or_default(),
                pass: non_empty_env("SMTP_PASS").unwrap_or_default(),
                from,
                to,
            }),
            _ => None,
        };

        Self {
            discord_webhook: non_empty_env("DISCORD_WEBHOOK_URL"),
            slack_webhook: non_empty_env("SLACK_WEBHOOK_URL"),
            kakao_webhook: non_empty_env("KAKAO_WEBHOOK_URL"),
            email,
            console: non_empty_env("NOTIFY_CONSOLE").is_some_and(|v| v == "1"),
        }
    }
}

/// Fan-out over all configured channels.
pub struct Notifier {
    channels: Vec<Arc<dyn Channel>>,
    format: FormatSettings,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn Channel>>, format: FormatSettings) -> Self {
        Self { channels, format }
    }

    /// Builds channels in a fixed order: discord, slack, kakao, email, console.
    /// A channel whose settings are unusable is skipped with a warning.
    pub fn from_config(cfg: &ChannelConfig, format: FormatSettings, client: Client) -> Self {
        let mut channels: Vec<Arc<dyn Channel>> = Vec::new();

        if let Some(url) = &cfg.discord_webhook {
            channels.push(Arc::new(discord::DiscordChannel::new(
                url.clone(),
                client.clone(),
            )));
        }
        if let Some(url) = &cfg.slack_webhook {
            channels.push(Arc::new(slack::SlackChannel::new(url.clone(), client.clone())));
        }
        if let Some(url) = &cfg.kakao_webhook {
            channels.push(Arc::new(kakao::KakaoChannel::new(url.clone(), client.clone())));
        }
        if let Some(email) = &cfg.email {
            match email::EmailChannel::from_settings(email) {
                Ok(ch) => channels.push(Arc::new(ch)),
                Err(e) => tracing::warn!(target: "notify", error = ?e, "email channel disabled"),
            }
        }
        if cfg.console {
            channels.push(Arc::new(console::ConsoleChannel));
        }

        Self::new(channels, format)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Sends `items` to every channel. Returns one outcome per channel in
    /// configuration order; empty when `items` or the channel list is empty.
    pub async fn send_all(&self, items: &[Item]) -> Vec<ChannelOutcome> {
        if items.is_empty() {
            tracing::debug!(target: "notify", "nothing to send");
            return Vec::new();
        }
        if self.channels.is_empty() {
            tracing::warn!(target: "notify", count = items.len(), "no channels configured");
            return Vec::new();
        }

        let digest = Arc::new(Digest::new(items.to_vec(), self.format.clone()));
        let mut set = JoinSet::new();
        for (idx, ch) in self.channels.iter().enumerate() {
            let ch = Arc::clone(ch);
            let digest = Arc::clone(&digest);
            set.spawn(async move { (idx, ch.deliver(&digest).await) });
        }

        let mut slots: Vec<Option<ChannelOutcome>> = vec![None; self.channels.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, res)) => {
                    let name = self.channels[idx].name();
                    slots[idx] = Some(match res {
                        Ok(()) => ChannelOutcome::ok(name),
                        Err(e) => ChannelOutcome::failed(name, format!("{e:#}")),
                    });
                }
                Err(e) => tracing::error!(target: "notify", error = ?e, "delivery task failed"),
            }
        }

        let outcomes: Vec<ChannelOutcome> = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    ChannelOutcome::failed(self.channels[idx].name(), "delivery task aborted".into())
                })
            })
            .collect();

        for o in &outcomes {
            let outcome = if o.success { "ok" } else { "error" };
            counter!(
                "notify_deliveries_total",
                "channel" => o.channel.clone(),
                "outcome" => outcome
            )
            .increment(1);
            match &o.error {
                None => tracing::info!(target: "notify", channel = %o.channel, count = items.len(), "delivered"),
                Some(err) => tracing::warn!(target: "notify", channel = %o.channel, error = %err, "delivery failed"),
            }
        }

        outcomes
    }

    /// Sends two sample items through every channel.
    pub async fn send_test(&self) -> Vec<ChannelOutcome> {
        self.send_all(&sample_items()).await
    }
}

fn sample_items() -> Vec<Item> {
    let now = Utc::now();
    vec![
        Item {
            title: "Test: React 19 release notes".into(),
            url: "https://example.com/test-react-19".into(),
            description: "Connectivity check from the article courier.".into(),
            published_at: now,
            tags: vec!["react".into()],
            source: "Test".into(),
        },
        Item {
            title: "Test: Modern CSS layout".into(),
            url: "https://example.com/test-css-layout".into(),
            description: "Second sample item.".into(),
            published_at: now,
            tags: vec!["css".into()],
            source: "Test".into(),
        },
    ]
}
