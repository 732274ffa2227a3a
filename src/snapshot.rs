//! snapshot.rs — latest full aggregation result plus the read-only query projection.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::ingest::types::Item;
use crate::ledger::write_json_atomic;

pub const SNAPSHOT_FILE: &str = "articles.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub total_count: usize,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Snapshot {
    pub fn new(items: Vec<Item>, now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            total_count: items.len(),
            items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing was saved yet or the file is unreadable.
    pub async fn load(&self) -> Option<Snapshot> {
        let s = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&s) {
            Ok(snap) => Some(snap),
            Err(e) => {
                tracing::warn!(target: "ledger", path = %self.path.display(), error = %e, "unreadable snapshot");
                None
            }
        }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        write_json_atomic(&self.path, snapshot).await
    }
}

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub source: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    pub articles: Vec<Item>,
    pub total_count: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// Filter by source / keyword substring (case-insensitive), then slice one page.
pub fn query_items(items: &[Item], q: &ArticleQuery) -> ArticlePage {
    let source = q
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    let keyword = q
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let matching: Vec<&Item> = items
        .iter()
        .filter(|it| {
            source
                .as_deref()
                .map_or(true, |s| it.source.to_lowercase().contains(s))
        })
        .filter(|it| {
            keyword.as_deref().map_or(true, |k| {
                it.title.to_lowercase().contains(k) || it.description.to_lowercase().contains(k)
            })
        })
        .collect();

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let total = matching.len();
    let start = (page - 1).saturating_mul(limit);
    let end = start.saturating_add(limit).min(total);

    ArticlePage {
        articles: matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|it| (*it).clone())
            .collect(),
        total_count: total,
        current_page: page,
        total_pages: total.div_ceil(limit),
        has_next_page: end < total,
        has_prev_page: start > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn it(n: usize, source: &str, title: &str) -> Item {
        Item {
            title: title.into(),
            url: format!("https://a.test/{n}"),
            description: format!("desc {n}"),
            published_at: Utc::now(),
            tags: vec![],
            source: source.into(),
        }
    }

    fn sample() -> Vec<Item> {
        (0..25)
            .map(|n| {
                let src = if n % 2 == 0 { "Dev.to" } else { "CSS-Tricks" };
                let title = if n % 5 == 0 { "React news" } else { "Other" };
                it(n, src, title)
            })
            .collect()
    }

    #[test]
    fn paging_defaults_and_bounds() {
        let items = sample();
        let p1 = query_items(&items, &ArticleQuery::default());
        assert_eq!(p1.articles.len(), 20);
        assert_eq!(p1.total_pages, 2);
        assert!(p1.has_next_page && !p1.has_prev_page);

        let p2 = query_items(&items, &ArticleQuery { page: Some(2), ..Default::default() });
        assert_eq!(p2.articles.len(), 5);
        assert!(!p2.has_next_page && p2.has_prev_page);

        let past = query_items(&items, &ArticleQuery { page: Some(9), ..Default::default() });
        assert!(past.articles.is_empty());
        assert_eq!(past.total_count, 25);
    }

    #[test]
    fn source_and_keyword_filters_are_case_insensitive() {
        let items = sample();
        let q = ArticleQuery {
            source: Some("css".into()),
            keyword: Some("REACT".into()),
            limit: Some(100),
            ..Default::default()
        };
        let page = query_items(&items, &q);
        // odd n divisible by 5: 5, 15
        assert_eq!(page.total_count, 2);
        assert!(page.articles.iter().all(|a| a.source == "CSS-Tricks"));
    }

    #[tokio::test]
    async fn store_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load().await.is_none());

        let snap = Snapshot::new(sample(), Utc::now());
        store.save(&snap).await.unwrap();
        let back = store.load().await.unwrap();
        assert_eq!(back.total_count, 25);
        assert_eq!(back, snap);
    }
}
