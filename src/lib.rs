// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod snapshot;

use std::sync::Arc;

use anyhow::Context;

pub use crate::api::create_router;
pub use crate::config::AppConfig;
pub use crate::coordinator::{Coordinator, CrawlResult, JobKind};
pub use crate::ingest::types::Item;

use crate::ingest::providers::build_provider;
use crate::ingest::Aggregator;
use crate::ledger::LedgerStore;
use crate::notify::{ChannelConfig, Notifier};
use crate::snapshot::SnapshotStore;

/// Shared HTTP client for sources and webhooks.
pub fn http_client(cfg: &AppConfig) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(cfg.crawler.user_agent.clone())
        .timeout(cfg.crawler.request_timeout())
        .build()
        .context("building http client")
}

/// Wire every component from configuration.
pub fn build_coordinator(
    cfg: &AppConfig,
    channels: &ChannelConfig,
    client: reqwest::Client,
) -> Arc<Coordinator> {
    let providers = cfg
        .sources
        .iter()
        .map(|d| build_provider(d, client.clone(), &cfg.crawler))
        .collect();
    let aggregator = Aggregator::new(
        providers,
        cfg.keywords.clone(),
        cfg.crawler.request_delay(),
    );
    let notifier = Notifier::from_config(channels, cfg.notify.clone(), client);

    tracing::info!(
        sources = cfg.sources.len(),
        channels = ?notifier.channel_names(),
        data_dir = %cfg.storage.data_dir.display(),
        "coordinator ready"
    );

    Coordinator::new(
        aggregator,
        notifier,
        LedgerStore::new(&cfg.storage.data_dir, cfg.storage.ledger_cap),
        SnapshotStore::new(&cfg.storage.data_dir),
        cfg.scheduler.clone(),
    )
}
