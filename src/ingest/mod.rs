// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod types;

use crate::ingest::config::{clean_keywords, is_http_url};
use crate::ingest::types::{Item, SourceProvider};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "crawl_items_fetched_total",
            "Items parsed from provider responses."
        );
        describe_counter!(
            "crawl_items_found_total",
            "Items passing the validity check."
        );
        describe_counter!(
            "crawl_items_kept_total",
            "Items passing validity and keyword filters."
        );
        describe_counter!(
            "crawl_source_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("crawl_parse_ms", "Provider parse time in milliseconds.");
        describe_histogram!("crawl_duration_ms", "Whole aggregation time in milliseconds.");
        describe_counter!("crawl_runs_total", "Coordinator runs by outcome.");
        describe_counter!(
            "notify_deliveries_total",
            "Channel delivery attempts by outcome."
        );
        describe_gauge!("crawl_last_run_ts", "Unix ts when the last run finished.");
        describe_gauge!("crawl_sources_configured", "Number of configured sources.");
    });
}

/// Per-run counters. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    /// Valid items across all sources.
    pub items_found: usize,
    /// Valid items that also matched a keyword.
    pub items_filtered: usize,
    pub duration_ms: u64,
    pub memory_mb: u64,
}

/// Non-empty title and an absolute http(s) url.
pub fn is_valid_item(item: &Item) -> bool {
    !item.title.trim().is_empty() && is_http_url(&item.url)
}

/// `keywords` must already be lower-case. An empty list keeps everything.
pub fn matches_keywords(item: &Item, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let text = item.search_text();
    keywords.iter().any(|k| text.contains(k.as_str()))
}

/// First occurrence per identity key wins; order is preserved.
pub fn dedup_by_identity(items: Vec<Item>) -> Vec<Item> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|it| seen.insert(it.identity_key().to_string()))
        .collect()
}

/// Newest first; equal timestamps keep their relative order.
pub fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Validity + keyword filters for one batch. Returns (valid count, survivors).
pub fn filter_batch(raw: Vec<Item>, keywords: &[String]) -> (usize, Vec<Item>) {
    let valid: Vec<Item> = raw.into_iter().filter(is_valid_item).collect();
    let found = valid.len();
    let kept = valid
        .into_iter()
        .filter(|it| matches_keywords(it, keywords))
        .collect();
    (found, kept)
}

fn resident_memory_mb() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = sysinfo::System::new();
    sys.refresh_processes_specifics(
        sysinfo::ProcessesToUpdate::Some(&[pid]),
        sysinfo::ProcessRefreshKind::new().with_memory(),
    );
    sys.process(pid)
        .map(|p| p.memory() / 1024 / 1024)
        .unwrap_or(0)
}

/// Drives every provider and produces the filtered, deduplicated, sorted result.
pub struct Aggregator {
    providers: Vec<Box<dyn SourceProvider>>,
    keywords: Vec<String>,
    request_delay: Duration,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Box<dyn SourceProvider>>,
        keywords: Vec<String>,
        request_delay: Duration,
    ) -> Self {
        Self {
            providers,
            keywords: clean_keywords(keywords),
            request_delay,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Sources run one at a time in declaration order with a pause in between.
    /// A failing source is logged, counted, and skipped; there is no retry.
    pub async fn crawl_all(&self) -> (Vec<Item>, RunMetrics) {
        ensure_metrics_described();
        let t0 = Instant::now();
        let mut m = RunMetrics::default();
        let mut all = Vec::new();

        tracing::info!(target: "crawl", sources = self.providers.len(), "crawl started");

        for (idx, p) in self.providers.iter().enumerate() {
            if idx > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            m.sources_attempted += 1;

            match p.fetch_latest().await {
                Ok(raw) => {
                    let fetched = raw.len();
                    let (found, mut kept) = filter_batch(raw, &self.keywords);
                    m.items_found += found;
                    m.items_filtered += kept.len();
                    m.sources_succeeded += 1;
                    counter!("crawl_items_found_total").increment(found as u64);
                    counter!("crawl_items_kept_total").increment(kept.len() as u64);
                    tracing::info!(
                        target: "crawl",
                        source = p.name(),
                        fetched,
                        valid = found,
                        kept = kept.len(),
                        "source done"
                    );
                    all.append(&mut kept);
                }
                Err(e) => {
                    m.sources_failed += 1;
                    counter!("crawl_source_errors_total", "source" => p.name().to_string())
                        .increment(1);
                    tracing::warn!(target: "crawl", error = ?e, source = p.name(), "provider error");
                }
            }
        }

        let mut unique = dedup_by_identity(all);
        sort_newest_first(&mut unique);

        m.duration_ms = t0.elapsed().as_millis() as u64;
        m.memory_mb = resident_memory_mb();
        metrics::histogram!("crawl_duration_ms").record(m.duration_ms as f64);

        tracing::info!(
            target: "crawl",
            total = unique.len(),
            succeeded = m.sources_succeeded,
            failed = m.sources_failed,
            duration_ms = m.duration_ms,
            memory_mb = m.memory_mb,
            "crawl finished"
        );
        (unique, m)
    }

    /// Run a single named source through the filters. Unknown name yields nothing.
    pub async fn probe_source(&self, name: &str) -> Vec<Item> {
        let Some(p) = self
            .providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
        else {
            tracing::warn!(target: "crawl", source = name, "unknown source");
            return Vec::new();
        };
        let raw = providers::fetch(p.as_ref()).await;
        let fetched = raw.len();
        let (found, kept) = filter_batch(raw, &self.keywords);
        tracing::info!(target: "crawl", source = name, fetched, valid = found, kept = kept.len(), "probe");
        kept
    }
}
