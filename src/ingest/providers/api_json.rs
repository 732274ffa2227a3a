// src/ingest/providers/api_json.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::config::{ApiParams, CrawlerSettings};
use crate::ingest::providers::{clean_text, published_or, truncate_description};
use crate::ingest::types::{Item, SourceProvider};

// Schema of one record from a Dev.to style article listing.
#[derive(Debug, Deserialize)]
struct ApiArticle {
    title: Option<String>,
    url: Option<String>,
    canonical_url: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    tag_list: Option<TagList>,
}

// Listing endpoints return an array, single-article endpoints a comma string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagList {
    List(Vec<String>),
    Csv(String),
}

impl TagList {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagList::List(v) => v,
            TagList::Csv(s) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    List(Vec<ApiArticle>),
    Wrapped { articles: Vec<ApiArticle> },
}

pub struct ApiJsonProvider {
    name: String,
    max_description_len: usize,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        params: ApiParams,
        default_per_page: u32,
        user_agent: String,
        timeout: Duration,
        client: reqwest::Client,
    },
}

impl ApiJsonProvider {
    pub fn from_fixture(name: &str, body: &str, max_description_len: usize) -> Self {
        Self {
            name: name.to_string(),
            max_description_len,
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_url(
        name: &str,
        url: &str,
        params: ApiParams,
        client: reqwest::Client,
        settings: &CrawlerSettings,
    ) -> Self {
        Self {
            name: name.to_string(),
            max_description_len: settings.max_description_len,
            mode: Mode::Http {
                url: url.to_string(),
                params,
                default_per_page: settings.max_items_per_source,
                user_agent: settings.user_agent.clone(),
                timeout: settings.request_timeout(),
                client,
            },
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let payload: Payload = serde_json::from_str(s)
            .with_context(|| format!("parsing {} api json", self.name))?;
        let records = match payload {
            Payload::List(v) => v,
            Payload::Wrapped { articles } => articles,
        };

        let now = Utc::now();
        let mut out = Vec::with_capacity(records.len());
        for rec in records {
            let url = [rec.url.as_deref(), rec.canonical_url.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .find(|u| !u.is_empty())
                .unwrap_or_default()
                .to_string();
            let description = clean_text(rec.description.as_deref().unwrap_or_default());

            out.push(Item {
                title: clean_text(rec.title.as_deref().unwrap_or_default()),
                url,
                description: truncate_description(&description, self.max_description_len),
                published_at: published_or(
                    now,
                    &[rec.published_at.as_deref(), rec.created_at.as_deref()],
                ),
                tags: rec.tag_list.map(TagList::into_vec).unwrap_or_default(),
                source: self.name.clone(),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("crawl_parse_ms").record(ms);
        counter!("crawl_items_fetched_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for ApiJsonProvider {
    async fn fetch_latest(&self) -> Result<Vec<Item>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http {
                url,
                params,
                default_per_page,
                user_agent,
                timeout,
                client,
            } => {
                tracing::info!(target: "crawl", source = %self.name, "api fetch");
                let body = client
                    .get(url.as_str())
                    .query(&params.query(*default_per_page))
                    .header(USER_AGENT, user_agent.as_str())
                    .timeout(*timeout)
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} non-2xx", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
