//! quake-bridge binary entrypoint.
//! Loads configuration, installs logging/metrics, then polls the USGS feed and
//! publishes to Event Hubs until the process is stopped.

use anyhow::Context;
use quake_bridge::config::BridgeConfig;
use quake_bridge::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();
    telemetry::route_panics_to_tracing();
    tracing::info!("starting USGS earthquake bridge");

    // Missing EVENTHUB_NAMESPACE or bad numbers stop us here with a non-zero exit.
    let cfg = BridgeConfig::from_env().context("loading configuration")?;
    tracing::info!(
        poll_interval_secs = cfg.poll_interval.as_secs(),
        eventhub = %cfg.eventhub_name,
        "configuration loaded"
    );

    if let Some(addr) = cfg.metrics_addr {
        telemetry::install_prometheus(addr)?;
    }

    let poll = quake_bridge::build_poll_loop(&cfg)?;
    poll.run().await;
    Ok(())
}
