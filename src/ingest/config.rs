// src/ingest/config.rs
use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Static configuration entry for one source.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceDescriptor {
    pub name: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Kind-specific parameters. `kind = "api"` or `kind = "feed"` in TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    Api(ApiParams),
    Feed,
}

/// Query shape of a paginated JSON article API (Dev.to style).
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct ApiParams {
    /// Comma separated tag filter, sent as `?tag=`.
    #[serde(default)]
    pub tag: Option<String>,
    /// Page size; falls back to `crawler.max_items_per_source`.
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
}

impl ApiParams {
    pub fn query(&self, default_per_page: u32) -> Vec<(&'static str, String)> {
        let mut q = Vec::with_capacity(3);
        if let Some(tag) = self.tag.as_deref().filter(|t| !t.trim().is_empty()) {
            q.push(("tag", tag.trim().to_string()));
        }
        q.push((
            "per_page",
            self.per_page.unwrap_or(default_per_page).to_string(),
        ));
        if let Some(page) = self.page {
            q.push(("page", page.to_string()));
        }
        q
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_delay_ms() -> u64 {
    1_000
}
fn default_description_len() -> usize {
    200
}
fn default_items_per_source() -> u32 {
    20
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

/// Fetch/normalize knobs shared by every provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CrawlerSettings {
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pause between two sources, against remote rate limiting.
    #[serde(default = "default_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_description_len")]
    pub max_description_len: usize,
    #[serde(default = "default_items_per_source")]
    pub max_items_per_source: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout_secs(),
            request_delay_ms: default_delay_ms(),
            max_description_len: default_description_len(),
            max_items_per_source: default_items_per_source(),
            user_agent: default_user_agent(),
        }
    }
}

impl CrawlerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Absolute http(s) URL check shared by config validation and item validation.
pub fn is_http_url(s: &str) -> bool {
    match reqwest::Url::parse(s.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn validate_sources(sources: &[SourceDescriptor]) -> Result<()> {
    let mut names = HashSet::new();
    for s in sources {
        let name = s.name.trim();
        if name.is_empty() {
            bail!("source with endpoint {} has an empty name", s.endpoint);
        }
        if !names.insert(name.to_lowercase()) {
            bail!("duplicate source name: {name}");
        }
        if !is_http_url(&s.endpoint) {
            return Err(anyhow!(
                "source {name}: endpoint is not an absolute http(s) url: {}",
                s.endpoint
            ));
        }
        if let SourceKind::Api(p) = &s.kind {
            if let Some(n) = p.per_page {
                if !(1..=1000).contains(&n) {
                    bail!("source {name}: per_page must be within 1..=1000, got {n}");
                }
            }
        }
    }
    Ok(())
}

/// Trim, drop empties, lower-case and dedup while keeping declaration order.
pub fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && seen.insert(t.clone()) {
            out.push(t);
        }
    }
    out
}
