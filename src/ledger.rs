//! ledger.rs — durable record of everything already delivered.
//!
//! Loaded once at the start of a run and saved once at the end. A missing or
//! corrupt file means "nothing was ever sent", never an error.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::ingest::types::Item;

pub const DEFAULT_LEDGER_CAP: usize = 1000;
pub const LEDGER_FILE: &str = "last-run.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ledger {
    pub last_run_time: Option<DateTime<Utc>>,
    /// Most recent first.
    pub sent_items: Vec<Item>,
    pub last_sent_count: usize,
    pub last_job_kind: Option<String>,
}

impl Ledger {
    /// Candidates whose identity key was never delivered, in candidate order.
    pub fn diff_new(&self, candidates: &[Item]) -> Vec<Item> {
        let sent: HashSet<&str> = self.sent_items.iter().map(Item::identity_key).collect();
        candidates
            .iter()
            .filter(|c| !sent.contains(c.identity_key()))
            .cloned()
            .collect()
    }

    /// Prepend `newly_sent`, evict the oldest beyond `cap`, stamp the run.
    pub fn record_sent(
        self,
        newly_sent: &[Item],
        job_kind: &str,
        now: DateTime<Utc>,
        cap: usize,
    ) -> Ledger {
        let mut sent_items = Vec::with_capacity(newly_sent.len() + self.sent_items.len());
        sent_items.extend_from_slice(newly_sent);
        sent_items.extend(self.sent_items);
        sent_items.truncate(cap);

        Ledger {
            last_run_time: Some(now),
            sent_items,
            last_sent_count: newly_sent.len(),
            last_job_kind: Some(job_kind.to_string()),
        }
    }
}

/// JSON file backing for the [`Ledger`].
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    cap: usize,
}

impl LedgerStore {
    pub fn new(data_dir: impl AsRef<Path>, cap: usize) -> Self {
        Self {
            path: data_dir.as_ref().join(LEDGER_FILE),
            cap: cap.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub async fn load(&self) -> Ledger {
        match fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(target: "ledger", path = %self.path.display(), error = %e, "unreadable ledger, starting empty");
                Ledger::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(e) => {
                tracing::warn!(target: "ledger", path = %self.path.display(), error = %e, "ledger read failed, starting empty");
                Ledger::default()
            }
        }
    }

    pub async fn save(&self, ledger: &Ledger) -> Result<()> {
        write_json_atomic(&self.path, ledger).await
    }
}

/// Write to a sibling temp file, then rename over the target.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let body = serde_json::to_vec_pretty(value).context("serializing json")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
