// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One normalized article, as produced by a source provider.
///
/// Identity is the `url`; items without a url fall back to the `title`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String, // display name of the provider, e.g. "Dev.to"
}

impl Item {
    /// Key used for dedup within a run and against the delivery ledger.
    pub fn identity_key(&self) -> &str {
        if self.url.is_empty() {
            &self.title
        } else {
            &self.url
        }
    }

    /// Lower-cased `title description tags...` used by the keyword filter.
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.tags.join(" ")
        )
        .to_lowercase()
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<Item>>;
    fn name(&self) -> &str;
}
