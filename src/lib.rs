// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod publish;
pub mod telemetry;

use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::ingest::feed::HttpFeedFetcher;
use crate::ingest::scheduler::{PollLoop, TokioSleeper};
use crate::publish::credential::ManagedIdentityCredential;
use crate::publish::EventHubPublisher;

// ---- Re-exports for stable public API ----
pub use crate::ingest::scheduler::CycleOutcome;
pub use crate::ingest::types::{NormalizedEvent, RawFeedDocument};

/// Wire the production fetcher, publisher and timer from `cfg`.
pub fn build_poll_loop(cfg: &BridgeConfig) -> anyhow::Result<PollLoop> {
    let fetcher = HttpFeedFetcher::new(&cfg.feed_url, cfg.feed_timeout)?;
    let credential = Arc::new(ManagedIdentityCredential::from_env(cfg.publish_timeout)?);
    let publisher = EventHubPublisher::from_config(cfg, credential)?;
    tracing::info!(
        feed = %fetcher.url(),
        eventhub = %publisher.send_url(),
        max_batch_bytes = cfg.max_batch_bytes,
        "bridge components ready"
    );
    Ok(PollLoop::new(
        Box::new(fetcher),
        Box::new(publisher),
        Box::new(TokioSleeper),
        cfg.poll_interval,
    ))
}
