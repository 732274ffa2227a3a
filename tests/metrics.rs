// tests/metrics.rs
// The Prometheus recorder is process-wide; this file installs it once.

mod common;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use article_courier::metrics::Metrics;
use common::{coordinator, item, RecordingChannel, ScriptedSource};

#[tokio::test]
async fn metrics_endpoint_exposes_run_series() {
    let metrics = Metrics::init(2).expect("recorder installs");

    let dir = tempfile::tempdir().unwrap();
    let up = ScriptedSource::new("up", vec![item("one", "https://news.test/1", 1)]);
    let down = ScriptedSource::failing("down");
    let c = coordinator(
        dir.path(),
        &[up, down],
        &[RecordingChannel::ok("discord"), RecordingChannel::broken("slack")],
    );
    assert!(c.manual_run().await.success);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    for series in [
        "crawl_sources_configured 2",
        "crawl_runs_total{outcome=\"ok\"} 1",
        "crawl_source_errors_total{source=\"down\"} 1",
        "crawl_items_found_total",
        "crawl_duration_ms",
        "crawl_last_run_ts",
        "notify_deliveries_total{channel=\"discord\",outcome=\"ok\"} 1",
        "notify_deliveries_total{channel=\"slack\",outcome=\"error\"} 1",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
}
