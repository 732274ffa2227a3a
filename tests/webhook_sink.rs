// tests/webhook_sink.rs
// Real HTTP delivery against an in-process axum sink on 127.0.0.1:0.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde_json::Value;

use article_courier::notify::{ChannelConfig, FormatSettings, Notifier};
use article_courier::Item;

type Inbox = Arc<Mutex<Vec<(String, Value)>>>;

async fn spawn_sink() -> (String, Inbox) {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));

    async fn record(path: &str, inbox: &Inbox, body: Value) {
        inbox.lock().unwrap().push((path.to_string(), body));
    }

    let app = Router::new()
        .route(
            "/discord",
            post(|State(i): State<Inbox>, Json(b): Json<Value>| async move {
                record("discord", &i, b).await;
                StatusCode::NO_CONTENT
            }),
        )
        .route(
            "/slack",
            post(|State(i): State<Inbox>, Json(b): Json<Value>| async move {
                record("slack", &i, b).await;
                "ok"
            }),
        )
        .route(
            "/kakao",
            post(|State(i): State<Inbox>, Json(b): Json<Value>| async move {
                record("kakao", &i, b).await;
                StatusCode::OK
            }),
        )
        .route(
            "/broken",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .with_state(inbox.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), inbox)
}

fn items(n: usize) -> Vec<Item> {
    (1..=n)
        .map(|i| Item {
            title: format!("Frontend story {i}"),
            url: format!("https://news.test/{i}"),
            description: "Short summary.".into(),
            published_at: Utc::now(),
            tags: vec!["css".into()],
            source: "CSS-Tricks".into(),
        })
        .collect()
}

#[tokio::test]
async fn every_webhook_receives_its_format() {
    let (base, inbox) = spawn_sink().await;
    let cfg = ChannelConfig {
        discord_webhook: Some(format!("{base}/discord")),
        slack_webhook: Some(format!("{base}/slack")),
        kakao_webhook: Some(format!("{base}/kakao")),
        ..Default::default()
    };
    let notifier = Notifier::from_config(&cfg, FormatSettings::default(), reqwest::Client::new());
    assert_eq!(notifier.channel_names(), ["discord", "slack", "kakao"]);

    let out = notifier.send_all(&items(12)).await;
    assert!(out.iter().all(|o| o.success), "{out:?}");

    let inbox = inbox.lock().unwrap();
    assert_eq!(inbox.len(), 3);

    let discord = &inbox.iter().find(|(p, _)| p == "discord").unwrap().1;
    let content = discord["content"].as_str().unwrap();
    assert!(content.contains("**1. Frontend story 1**"));
    assert!(content.contains("... and **2** more articles."));
    assert_eq!(discord["username"], "Frontend News Bot");

    let slack = &inbox.iter().find(|(p, _)| p == "slack").unwrap().1;
    assert_eq!(slack["blocks"][0]["type"], "header");
    assert_eq!(slack["text"], "🚀 New frontend articles: 12 found");

    let kakao = &inbox.iter().find(|(p, _)| p == "kakao").unwrap().1;
    assert!(kakao["text"].as_str().unwrap().contains("📌 CSS-Tricks"));
    assert_eq!(kakao["username"], "Frontend News Bot");
}

#[tokio::test]
async fn server_error_is_reported_without_blocking_others() {
    let (base, inbox) = spawn_sink().await;
    let cfg = ChannelConfig {
        slack_webhook: Some(format!("{base}/broken")),
        kakao_webhook: Some(format!("{base}/kakao")),
        ..Default::default()
    };
    let notifier = Notifier::from_config(&cfg, FormatSettings::default(), reqwest::Client::new());

    let out = notifier.send_all(&items(1)).await;
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].channel, "slack");
    assert!(!out[0].success);
    assert!(out[0].error.as_deref().unwrap().contains("slack non-2xx"));
    assert!(out[1].success);
    assert_eq!(inbox.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_endpoint_fails_that_channel_only() {
    let (base, _inbox) = spawn_sink().await;
    let cfg = ChannelConfig {
        kakao_webhook: Some("http://127.0.0.1:9/nothing-listens-here".into()),
        slack_webhook: Some(format!("{base}/slack")),
        ..Default::default()
    };
    let notifier = Notifier::from_config(&cfg, FormatSettings::default(), reqwest::Client::new());

    let out = notifier.send_test().await;
    assert_eq!(out.len(), 2);
    assert!(out[0].success, "slack should succeed: {out:?}");
    assert!(!out[1].success);
}

#[tokio::test]
async fn discord_retries_a_transient_server_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/flaky",
        post(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::NO_CONTENT
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let cfg = ChannelConfig {
        discord_webhook: Some(format!("http://{addr}/flaky")),
        ..Default::default()
    };
    let notifier = Notifier::from_config(&cfg, FormatSettings::default(), reqwest::Client::new());

    let out = notifier.send_all(&items(2)).await;
    assert_eq!(out.len(), 1);
    assert!(out[0].success, "{out:?}");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
