//! One fetch + transform against the configured feed; prints each normalized
//! event as a JSON line. Nothing is published.

use anyhow::Context;
use quake_bridge::config::FeedConfig;
use quake_bridge::ingest::{feed::HttpFeedFetcher, fetch_and_transform};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let feed = FeedConfig::from_env().context("loading feed configuration")?;
    let fetcher = HttpFeedFetcher::new(feed.url, feed.timeout)?;
    let events = fetch_and_transform(&fetcher).await?;
    for ev in &events {
        println!("{}", serde_json::to_string(ev)?);
    }
    tracing::info!(count = events.len(), "fetch-once done");
    Ok(())
}
