// src/notify/format.rs
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ingest::providers::truncate_description;
use crate::ingest::types::Item;

/// How a digest message is rendered. Shared by every channel. `[notify]` in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormatSettings {
    /// Items rendered verbatim; the rest are summarized as a count.
    pub max_items: usize,
    /// Description cut-off inside a message.
    pub snippet_len: usize,
    pub bot_name: String,
    pub heading: String,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            max_items: 10,
            snippet_len: 100,
            bot_name: "Frontend News Bot".to_string(),
            heading: "New frontend articles".to_string(),
        }
    }
}

/// Items to deliver plus everything needed to render them.
#[derive(Debug, Clone)]
pub struct Digest {
    pub items: Vec<Item>,
    pub settings: FormatSettings,
    /// Local date shown in headers, e.g. "2025-09-06".
    pub date: String,
}

impl Digest {
    pub fn new(items: Vec<Item>, settings: FormatSettings) -> Self {
        Self {
            items,
            settings,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    pub fn shown(&self) -> &[Item] {
        let n = self.items.len().min(self.settings.max_items);
        &self.items[..n]
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.settings.max_items)
    }

    pub fn title_line(&self) -> String {
        format!("🚀 {}: {} found", self.settings.heading, self.items.len())
    }
}

/// Markdown text used by Discord, Kakao, console and email.
pub fn render_text(d: &Digest) -> String {
    let mut msg = format!("🚀 **{}** ({})\n\n", d.settings.heading, d.date);

    for (i, it) in d.shown().iter().enumerate() {
        msg.push_str(&format!("**{}. {}**\n", i + 1, it.title));
        msg.push_str(&format!("📌 {}\n", it.source));
        msg.push_str(&format!("🔗 {}\n", it.url));
        if !it.description.is_empty() {
            msg.push_str(&format!(
                "💬 {}\n",
                truncate_description(&it.description, d.settings.snippet_len)
            ));
        }
        msg.push('\n');
    }

    let rest = d.remaining();
    if rest > 0 {
        msg.push_str(&format!("\n... and **{rest}** more articles."));
    }
    msg
}

/// Slack Block Kit layout: header, date, divider, one section per item.
pub fn slack_blocks(d: &Digest) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": d.title_line() }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("Collected {}", d.date) }
        }),
        json!({ "type": "divider" }),
    ];

    for (i, it) in d.shown().iter().enumerate() {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*{}. {}*\n📌 {}\n🔗 <{}|Read>", i + 1, it.title, it.source, it.url)
            }
        }));
    }

    let rest = d.remaining();
    if rest > 0 {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("... and *{rest}* more articles.") }
        }));
    }

    json!({ "text": d.title_line(), "blocks": blocks })
}
