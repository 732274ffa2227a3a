// tests/common/mod.rs
// Shared fakes for integration tests: scripted sources and recording channels.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use article_courier::coordinator::Coordinator;
use article_courier::ingest::types::{Item, SourceProvider};
use article_courier::ingest::Aggregator;
use article_courier::ledger::LedgerStore;
use article_courier::notify::{Channel, Digest, FormatSettings, Notifier};
use article_courier::scheduler::SchedulerSettings;
use article_courier::snapshot::SnapshotStore;

pub fn item(title: &str, url: &str, minute: u32) -> Item {
    Item {
        title: title.to_string(),
        url: url.to_string(),
        description: "frontend news".to_string(),
        published_at: Utc.with_ymd_and_hms(2025, 9, 1, 12, minute, 0).unwrap(),
        tags: vec!["react".to_string()],
        source: "Fake".to_string(),
    }
}

/// A source returning a fixed batch, optionally after a delay, counting its calls.
pub struct ScriptedSource {
    pub name: String,
    pub items: Mutex<Vec<Item>>,
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str, items: Vec<Item>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items: Mutex::new(items),
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &str, items: Vec<Item>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items: Mutex::new(items),
            delay,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items: Mutex::new(vec![]),
            delay: Duration::ZERO,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Lets one `Arc<ScriptedSource>` be boxed into an aggregator while the test keeps a handle.
pub struct Shared(pub Arc<ScriptedSource>);

#[async_trait]
impl SourceProvider for Shared {
    async fn fetch_latest(&self) -> Result<Vec<Item>> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if !self.0.delay.is_zero() {
            tokio::time::sleep(self.0.delay).await;
        }
        if self.0.fail {
            bail!("{} is down", self.0.name);
        }
        Ok(self.0.items.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        &self.0.name
    }
}

pub fn providers(sources: &[Arc<ScriptedSource>]) -> Vec<Box<dyn SourceProvider>> {
    sources
        .iter()
        .map(|s| Box::new(Shared(s.clone())) as Box<dyn SourceProvider>)
        .collect()
}

/// A channel recording every batch it was asked to deliver.
pub struct RecordingChannel {
    pub name: String,
    pub fail: bool,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl RecordingChannel {
    pub fn ok(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: false,
            batches: Mutex::new(vec![]),
        })
    }

    pub fn broken(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: true,
            batches: Mutex::new(vec![]),
        })
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let urls = digest.items.iter().map(|i| i.url.clone()).collect();
        self.batches.lock().unwrap().push(urls);
        if self.fail {
            bail!("{} webhook returned 500", self.name);
        }
        Ok(())
    }
}

pub fn channels(list: &[Arc<RecordingChannel>]) -> Vec<Arc<dyn Channel>> {
    list.iter().map(|c| c.clone() as Arc<dyn Channel>).collect()
}

/// Coordinator over fakes, persisting into `dir`. No inter-source delay, no keyword filter.
pub fn coordinator(
    dir: &Path,
    sources: &[Arc<ScriptedSource>],
    chans: &[Arc<RecordingChannel>],
) -> Arc<Coordinator> {
    let settings = SchedulerSettings {
        initial_run_delay_secs: 0,
        stop_timeout_secs: 5,
        ..SchedulerSettings::default()
    };
    Coordinator::new(
        Aggregator::new(providers(sources), vec![], Duration::ZERO),
        Notifier::new(channels(chans), FormatSettings::default()),
        LedgerStore::new(dir, 1000),
        SnapshotStore::new(dir),
        settings,
    )
}
