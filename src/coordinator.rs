// src/coordinator.rs
//! Run coordination: one pipeline execution at a time, triggered manually or
//! by the schedule registry.
//!
//! A run is: load ledger, crawl, diff, save snapshot, notify, record + save
//! ledger. A trigger that arrives while a run is in progress is dropped with a
//! "skipped" result, not queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::Notify;

use crate::ingest::types::Item;
use crate::ingest::{Aggregator, RunMetrics};
use crate::ledger::LedgerStore;
use crate::notify::{any_delivered, ChannelOutcome, Notifier};
use crate::scheduler::{self, JobInfo, ScheduleHandle, SchedulerSettings};
use crate::snapshot::{Snapshot, SnapshotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Manual,
    Scheduled,
    Initial,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Manual => "manual",
            JobKind::Scheduled => "scheduled",
            JobKind::Initial => "initial",
        })
    }
}

/// Outcome of one `run_crawling_job` call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub success: bool,
    /// Another run was in progress; nothing was done.
    pub skipped: bool,
    pub job_kind: String,
    pub total_articles: usize,
    pub new_articles: usize,
    pub message_sent: bool,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    pub deliveries: Vec<ChannelOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
}

impl CrawlResult {
    fn skipped(kind: JobKind) -> Self {
        Self {
            success: false,
            skipped: true,
            job_kind: kind.to_string(),
            timestamp: Utc::now(),
            message: "a crawl is already running".into(),
            ..Default::default()
        }
    }

    fn failed(kind: JobKind, started: Instant, error: String) -> Self {
        Self {
            success: false,
            job_kind: kind.to_string(),
            duration_secs: started.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
            message: "crawl failed".into(),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Ledger-derived status plus scheduler state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub is_running: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    pub total_sent_articles: usize,
    pub last_sent_count: usize,
    pub last_job_kind: Option<String>,
    pub scheduled_jobs_count: usize,
    pub is_scheduler_active: bool,
}

/// Clears the running flag on every exit path, panics included, and wakes
/// anyone waiting for the coordinator to go idle.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    idle: &'a Notify,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

#[derive(Default)]
struct Registry {
    jobs: Vec<ScheduleHandle>,
    initial: Option<ScheduleHandle>,
}

pub struct Coordinator {
    aggregator: Aggregator,
    notifier: Notifier,
    ledger: LedgerStore,
    snapshots: SnapshotStore,
    settings: SchedulerSettings,
    running: AtomicBool,
    idle: Notify,
    registry: Mutex<Registry>,
}

impl Coordinator {
    pub fn new(
        aggregator: Aggregator,
        notifier: Notifier,
        ledger: LedgerStore,
        snapshots: SnapshotStore,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            notifier,
            ledger,
            snapshots,
            settings,
            running: AtomicBool::new(false),
            idle: Notify::new(),
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn manual_run(self: &Arc<Self>) -> CrawlResult {
        self.run_crawling_job(JobKind::Manual).await
    }

    /// Single entry point for every trigger.
    pub async fn run_crawling_job(self: &Arc<Self>, kind: JobKind) -> CrawlResult {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!(job = %kind, "crawl already running, trigger skipped");
            counter!("crawl_runs_total", "outcome" => "skipped").increment(1);
            return CrawlResult::skipped(kind);
        }

        let started = Instant::now();
        let this = Arc::clone(self);
        // The run lives in its own task so a panic inside it is contained here.
        let joined = tokio::spawn(async move {
            let _guard = RunGuard {
                running: &this.running,
                idle: &this.idle,
            };
            this.execute(kind, started).await
        })
        .await;

        let result = match joined {
            Ok(r) => r,
            Err(e) => {
                // the guard has already been dropped during unwinding
                self.running.store(false, Ordering::SeqCst);
                self.idle.notify_waiters();
                tracing::error!(job = %kind, error = %e, "crawl task failed");
                CrawlResult::failed(kind, started, format!("internal error: {e}"))
            }
        };

        let outcome = if result.success { "ok" } else { "error" };
        counter!("crawl_runs_total", "outcome" => outcome).increment(1);
        gauge!("crawl_last_run_ts").set(Utc::now().timestamp() as f64);
        result
    }

    async fn execute(&self, kind: JobKind, started: Instant) -> CrawlResult {
        tracing::info!(job = %kind, "crawl started");

        let ledger = self.ledger.load().await;
        let (items, metrics) = self.aggregator.crawl_all().await;
        let fresh = ledger.diff_new(&items);
        let total = items.len();

        let snapshot = Snapshot::new(items, Utc::now());
        if let Err(e) = self.snapshots.save(&snapshot).await {
            tracing::warn!(target: "ledger", error = ?e, "snapshot save failed");
        }

        let mut result = CrawlResult {
            success: true,
            job_kind: kind.to_string(),
            total_articles: total,
            new_articles: fresh.len(),
            timestamp: Utc::now(),
            metrics: Some(metrics),
            ..Default::default()
        };

        if fresh.is_empty() {
            tracing::info!(job = %kind, total, "no new articles");
            result.message = "no new articles".into();
        } else if self.notifier.channel_count() == 0 {
            tracing::warn!(job = %kind, new = fresh.len(), "new articles but no channels configured");
            result.message = "no channels configured".into();
        } else {
            result.deliveries = self.notifier.send_all(&fresh).await;
            result.message_sent = any_delivered(&result.deliveries);

            if result.message_sent {
                self.record(ledger, &fresh, kind).await;
                result.message = format!("sent {} new articles", fresh.len());
            } else {
                tracing::warn!(job = %kind, new = fresh.len(), "delivery failed on every channel");
                result.message = "delivery failed on every channel".into();
            }
        }

        result.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            job = %kind,
            total = result.total_articles,
            new = result.new_articles,
            sent = result.message_sent,
            secs = result.duration_secs,
            "crawl finished"
        );
        result
    }

    async fn record(&self, ledger: crate::ledger::Ledger, sent: &[Item], kind: JobKind) {
        let next = ledger.record_sent(sent, &kind.to_string(), Utc::now(), self.ledger.cap());
        if let Err(e) = self.ledger.save(&next).await {
            // delivery already happened; the next run may re-send these
            tracing::warn!(target: "ledger", error = ?e, "ledger save failed");
        }
    }

    pub async fn status(&self) -> CoordinatorStatus {
        let ledger = self.ledger.load().await;
        let (count, active) = {
            let reg = self.registry();
            (reg.jobs.len(), reg.jobs.iter().any(ScheduleHandle::is_active))
        };
        CoordinatorStatus {
            is_running: self.is_running(),
            last_run_time: ledger.last_run_time,
            total_sent_articles: ledger.sent_items.len(),
            last_sent_count: ledger.last_sent_count,
            last_job_kind: ledger.last_job_kind,
            scheduled_jobs_count: count,
            is_scheduler_active: active,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // a poisoned registry only means a panic elsewhere; the handles are still usable
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Replace every schedule with the configured jobs. Optionally fires an
    /// `initial` run after the configured delay.
    pub fn start_scheduler(self: &Arc<Self>, initial_run: bool) {
        let mut jobs = Vec::with_capacity(self.settings.jobs.len());
        for spec in &self.settings.jobs {
            let schedule = match scheduler::parse_cron(&spec.cron) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(target: "scheduler", job = %spec.name, error = ?e, "skipping job");
                    continue;
                }
            };
            let weak = Arc::downgrade(self);
            let handle = scheduler::spawn_cron(&spec.name, &spec.cron, schedule, move || {
                trigger(weak.clone(), JobKind::Scheduled)
            });
            handle.set_active(spec.enabled);
            jobs.push(handle);
        }

        let initial = initial_run.then(|| {
            let weak = Arc::downgrade(self);
            scheduler::spawn_once("initial", self.settings.initial_run_delay(), move || {
                trigger(weak, JobKind::Initial)
            })
        });

        let mut reg = self.registry();
        for old in reg.jobs.iter().chain(reg.initial.iter()) {
            old.cancel();
        }
        tracing::info!(target: "scheduler", jobs = jobs.len(), initial_run, "scheduler started");
        reg.jobs = jobs;
        reg.initial = initial;
    }

    /// Cancel every future trigger. An in-flight run is left alone.
    pub fn stop_scheduler(&self) {
        let mut reg = self.registry();
        for h in reg.jobs.iter().chain(reg.initial.iter()) {
            h.cancel();
        }
        let n = reg.jobs.len();
        reg.jobs.clear();
        reg.initial = None;
        tracing::info!(target: "scheduler", cancelled = n, "scheduler stopped");
    }

    /// Pause or resume one job. Returns false if no job has that name.
    pub fn toggle_schedule(&self, name: &str, enable: bool) -> bool {
        let reg = self.registry();
        match reg.jobs.iter().find(|h| h.name() == name) {
            Some(h) => {
                h.set_active(enable);
                tracing::info!(target: "scheduler", job = name, enable, "schedule toggled");
                true
            }
            None => false,
        }
    }

    pub fn scheduled_jobs(&self) -> Vec<JobInfo> {
        self.registry().jobs.iter().map(ScheduleHandle::info).collect()
    }

    /// Stop scheduling, then wait up to `timeout` for an in-flight run.
    /// Returns false if the run was still going when the timeout hit.
    pub async fn cleanup(&self, timeout: Duration) -> bool {
        self.stop_scheduler();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register before checking the flag so a run ending in between is not missed.
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if !self.is_running() {
                break;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                tracing::warn!(timeout_secs = timeout.as_secs(), "crawl still running at shutdown");
                return false;
            }
        }
        tracing::info!("coordinator cleanup complete");
        true
    }

    /// Teardown with the configured timeout.
    pub async fn shutdown(&self) -> bool {
        self.cleanup(self.settings.stop_timeout()).await
    }
}

async fn trigger(weak: Weak<Coordinator>, kind: JobKind) {
    if let Some(c) = weak.upgrade() {
        let r = c.run_crawling_job(kind).await;
        if let Some(err) = r.error {
            tracing::warn!(target: "scheduler", job = %kind, error = %err, "triggered crawl failed");
        }
    }
}
