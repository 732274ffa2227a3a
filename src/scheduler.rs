// src/scheduler.rs
//! Wall-clock triggers. Each job is a spawned loop that sleeps until the next
//! cron fire time (local zone) and then calls its trigger.
//!
//! The loops only *trigger*; they never own a run. Stopping a loop therefore
//! never interrupts a run that is already in progress.

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn default_true() -> bool {
    true
}
fn default_initial_delay_secs() -> u64 {
    5
}
fn default_stop_timeout_secs() -> u64 {
    30
}
fn default_jobs() -> Vec<JobSpec> {
    vec![JobSpec {
        name: "morning-daily".into(),
        cron: "0 9 * * *".into(),
        enabled: true,
    }]
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobSpec {
    pub name: String,
    /// 5-field (`min hour dom mon dow`) or 6/7-field cron expression.
    pub cron: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    /// Start the schedules when the server boots.
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default = "default_true")]
    pub initial_run: bool,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_run_delay_secs: u64,
    /// Upper bound on how long teardown waits for an in-flight run.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default = "default_jobs")]
    pub jobs: Vec<JobSpec>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            autostart: true,
            initial_run: true,
            initial_run_delay_secs: default_initial_delay_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            jobs: default_jobs(),
        }
    }
}

impl SchedulerSettings {
    pub fn initial_run_delay(&self) -> Duration {
        Duration::from_secs(self.initial_run_delay_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Parse a cron expression, prepending a seconds field to 5-field expressions.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let parts = expr.split_whitespace().count();
    let full = if parts == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&full).with_context(|| format!("invalid cron expression: {expr:?}"))
}

pub fn validate_jobs(jobs: &[JobSpec]) -> Result<()> {
    let mut names = std::collections::HashSet::new();
    for j in jobs {
        if j.name.trim().is_empty() {
            bail!("scheduler job with cron {:?} has an empty name", j.cron);
        }
        if !names.insert(j.name.trim()) {
            bail!("duplicate scheduler job: {}", j.name);
        }
        parse_cron(&j.cron).with_context(|| format!("scheduler job {}", j.name))?;
    }
    Ok(())
}

/// Registry view of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub name: String,
    pub cron: String,
    pub active: bool,
}

/// Owner side of a spawned trigger loop. Dropping it stops the loop.
pub struct ScheduleHandle {
    name: String,
    cron: String,
    active: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Paused jobs keep ticking but skip the trigger.
    pub fn set_active(&self, on: bool) {
        self.active.store(on, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Ask the loop to exit at its next wake-up. A trigger already running completes.
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            name: self.name.clone(),
            cron: self.cron.clone(),
            active: self.is_active(),
        }
    }
}

/// Spawn a loop firing `trigger` at every upcoming time of `schedule`.
pub fn spawn_cron<F, Fut>(name: &str, cron: &str, schedule: Schedule, trigger: F) -> ScheduleHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop, mut stop_rx) = watch::channel(false);
    let active = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&active);
    let job = name.to_string();

    let task = tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Local).next() else {
                tracing::info!(target: "scheduler", job = %job, "no upcoming fire time, loop ends");
                break;
            };
            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(target: "scheduler", job = %job, next = %next, "sleeping until next fire");

            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if flag.load(Ordering::SeqCst) {
                tracing::info!(target: "scheduler", job = %job, "schedule fired");
                trigger().await;
            } else {
                tracing::debug!(target: "scheduler", job = %job, "paused, skipping");
            }
        }
    });

    ScheduleHandle {
        name: name.to_string(),
        cron: cron.to_string(),
        active,
        stop,
        task,
    }
}

/// Fire `trigger` once after `delay` unless cancelled first.
pub fn spawn_once<F, Fut>(name: &str, delay: Duration, trigger: F) -> ScheduleHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop, mut stop_rx) = watch::channel(false);
    let active = Arc::new(AtomicBool::new(true));

    let task = tokio::spawn(async move {
        tokio::select! {
            _ = stop_rx.changed() => {}
            _ = tokio::time::sleep(delay) => trigger().await,
        }
    });

    ScheduleHandle {
        name: name.to_string(),
        cron: String::new(),
        active,
        stop,
        task,
    }
}
