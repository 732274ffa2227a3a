//! Article courier: binary entrypoint.
//! Boots the Axum HTTP server, the schedule registry and the metrics endpoint.

use anyhow::Context;
use article_courier::api::AppState;
use article_courier::metrics::Metrics;
use article_courier::notify::ChannelConfig;
use article_courier::{build_coordinator, create_router, http_client, AppConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("article_courier=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load()?;
    let client = http_client(&cfg)?;
    let coordinator = build_coordinator(&cfg, &ChannelConfig::from_env(), client);

    let metrics = Metrics::init(cfg.sources.len())?;

    if cfg.scheduler.autostart {
        coordinator.start_scheduler(cfg.scheduler.initial_run);
    }

    let state = AppState {
        coordinator: coordinator.clone(),
    };
    let app = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind_addr))?;
    tracing::info!(addr = %cfg.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("http server")?;

    if !coordinator.shutdown().await {
        tracing::warn!("exiting with a crawl still in progress");
    }
    Ok(())
}
