use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::coordinator::{CoordinatorStatus, Coordinator, CrawlResult};
use crate::ingest::types::Item;
use crate::notify::{any_delivered, ChannelOutcome};
use crate::scheduler::JobInfo;
use crate::snapshot::{query_items, ArticlePage, ArticleQuery};

/// Items shown on the dashboard.
const RECENT_ITEMS: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/crawler/status", get(crawler_status))
        .route("/api/crawler/articles", get(list_articles))
        .route("/api/crawler/manual", post(manual_run))
        .route("/api/scheduler/status", get(scheduler_status))
        .route("/api/scheduler/start", post(scheduler_start))
        .route("/api/scheduler/stop", post(scheduler_stop))
        .route("/api/scheduler/toggle", post(scheduler_toggle))
        .route("/api/test/message", post(test_message))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookStatus {
    configured: bool,
    channels: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardOut {
    status: CoordinatorStatus,
    webhook_status: WebhookStatus,
    recent_articles: Vec<Item>,
    total_articles: usize,
    last_updated: Option<DateTime<Utc>>,
}

async fn crawler_status(State(state): State<AppState>) -> Json<DashboardOut> {
    let c = &state.coordinator;
    let status = c.status().await;
    let snapshot = c.snapshots().load().await;
    let channels = c.notifier().channel_names();

    let (recent, total, updated) = match snapshot {
        Some(s) => (
            s.items.into_iter().take(RECENT_ITEMS).collect(),
            s.total_count,
            Some(s.last_updated),
        ),
        None => (Vec::new(), 0, None),
    };

    Json(DashboardOut {
        status,
        webhook_status: WebhookStatus {
            configured: !channels.is_empty(),
            channels,
        },
        recent_articles: recent,
        total_articles: total,
        last_updated: updated,
    })
}

async fn list_articles(
    State(state): State<AppState>,
    Query(q): Query<ArticleQuery>,
) -> Json<ArticlePage> {
    let items = state
        .coordinator
        .snapshots()
        .load()
        .await
        .map(|s| s.items)
        .unwrap_or_default();
    Json(query_items(&items, &q))
}

async fn manual_run(State(state): State<AppState>) -> (StatusCode, Json<CrawlResult>) {
    tracing::info!(target: "api", "manual crawl requested");
    let r = state.coordinator.manual_run().await;
    let code = if r.skipped {
        StatusCode::CONFLICT
    } else if r.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(r))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SchedulerOut {
    status: CoordinatorStatus,
    jobs: Vec<JobInfo>,
}

async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerOut> {
    let c = &state.coordinator;
    Json(SchedulerOut {
        status: c.status().await,
        jobs: c.scheduled_jobs(),
    })
}

async fn scheduler_start(State(state): State<AppState>) -> Json<SchedulerOut> {
    tracing::info!(target: "api", "scheduler start requested");
    state.coordinator.start_scheduler(false);
    scheduler_status(State(state)).await
}

async fn scheduler_stop(State(state): State<AppState>) -> Json<SchedulerOut> {
    tracing::info!(target: "api", "scheduler stop requested");
    state.coordinator.stop_scheduler();
    scheduler_status(State(state)).await
}

#[derive(Deserialize)]
struct ToggleReq {
    name: String,
    enable: bool,
}

async fn scheduler_toggle(
    State(state): State<AppState>,
    Json(body): Json<ToggleReq>,
) -> Result<Json<SchedulerOut>, StatusCode> {
    if !state.coordinator.toggle_schedule(&body.name, body.enable) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(scheduler_status(State(state)).await)
}

#[derive(Serialize)]
struct TestMessageOut {
    success: bool,
    results: Vec<ChannelOutcome>,
}

async fn test_message(State(state): State<AppState>) -> Json<TestMessageOut> {
    tracing::info!(target: "api", "test message requested");
    let results = state.coordinator.notifier().send_test().await;
    Json(TestMessageOut {
        success: any_delivered(&results),
        results,
    })
}
