//! One-shot crawl without the server.
//!
//!   crawl_once            run the full pipeline once (manual job) and print the result
//!   crawl_once <source>   fetch and filter a single configured source, print its items

use article_courier::notify::ChannelConfig;
use article_courier::{build_coordinator, http_client, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = AppConfig::load()?;
    let client = http_client(&cfg)?;
    let coordinator = build_coordinator(&cfg, &ChannelConfig::from_env(), client);

    let out = match std::env::args().nth(1) {
        Some(name) => {
            let items = coordinator.aggregator().probe_source(&name).await;
            if items.is_empty() {
                eprintln!(
                    "no items from {name:?}; known sources: {}",
                    coordinator.aggregator().source_names().join(", ")
                );
            }
            serde_json::to_string_pretty(&items)?
        }
        None => serde_json::to_string_pretty(&coordinator.manual_run().await)?,
    };

    println!("{out}");
    Ok(())
}
