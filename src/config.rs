// src/config.rs
//! Process configuration, read once at startup and passed by reference.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_EVENTHUB_NAMESPACE: &str = "EVENTHUB_NAMESPACE";
pub const ENV_EVENTHUB_NAME: &str = "EVENTHUB_NAME";
pub const ENV_USGS_FEED: &str = "USGS_FEED";
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL";
pub const ENV_FEED_TIMEOUT_SECS: &str = "FEED_TIMEOUT_SECS";
pub const ENV_PUBLISH_TIMEOUT_SECS: &str = "PUBLISH_TIMEOUT_SECS";
pub const ENV_MAX_BATCH_BYTES: &str = "EVENTHUB_MAX_BATCH_BYTES";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

pub const DEFAULT_EVENTHUB_NAME: &str = "earthquakes";
pub const DEFAULT_USGS_FEED: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FEED_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;
/// Event Hubs caps a batch at 1 MiB; leave headroom for HTTP framing.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Fully-qualified namespace, e.g. `eq-eh-namespace.servicebus.windows.net`.
    /// A value with an explicit `http://` or `https://` scheme is used as the base URL.
    pub eventhub_namespace: String,
    pub eventhub_name: String,
    pub feed_url: String,
    /// Sleep after each cycle finishes (not a wall-clock period).
    pub poll_interval: Duration,
    pub feed_timeout: Duration,
    pub publish_timeout: Duration,
    pub max_batch_bytes: usize,
    pub metrics_addr: Option<SocketAddr>,
}

impl BridgeConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);

        let eventhub_namespace =
            get(ENV_EVENTHUB_NAMESPACE).ok_or(ConfigError::Missing(ENV_EVENTHUB_NAMESPACE))?;
        let eventhub_name =
            get(ENV_EVENTHUB_NAME).unwrap_or_else(|| DEFAULT_EVENTHUB_NAME.to_string());
        let feed = FeedConfig::from_lookup(&lookup)?;

        let poll_interval = parse_positive(
            ENV_POLL_INTERVAL,
            get(ENV_POLL_INTERVAL),
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let publish_timeout = parse_positive(
            ENV_PUBLISH_TIMEOUT_SECS,
            get(ENV_PUBLISH_TIMEOUT_SECS),
            DEFAULT_PUBLISH_TIMEOUT_SECS,
        )?;
        let max_batch_bytes = parse_positive(
            ENV_MAX_BATCH_BYTES,
            get(ENV_MAX_BATCH_BYTES),
            DEFAULT_MAX_BATCH_BYTES as u64,
        )? as usize;

        let metrics_addr = get(ENV_METRICS_ADDR)
            .map(|raw| {
                raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                    key: ENV_METRICS_ADDR,
                    reason: format!("{raw:?}: {e}"),
                })
            })
            .transpose()?;

        Ok(Self {
            eventhub_namespace,
            eventhub_name,
            feed_url: feed.url,
            poll_interval: Duration::from_secs(poll_interval),
            feed_timeout: feed.timeout,
            publish_timeout: Duration::from_secs(publish_timeout),
            max_batch_bytes,
            metrics_addr,
        })
    }

    /// Base URL of the namespace, without a trailing slash.
    pub fn eventhub_base_url(&self) -> String {
        let ns = self.eventhub_namespace.trim_end_matches('/');
        if ns.starts_with("http://") || ns.starts_with("https://") {
            ns.to_string()
        } else {
            format!("https://{ns}")
        }
    }

    /// REST endpoint that accepts batched sends for the configured hub.
    pub fn eventhub_send_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.eventhub_base_url(),
            self.eventhub_name.trim_matches('/')
        )
    }
}

/// Feed settings alone, for tools that fetch without publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub url: String,
    pub timeout: Duration,
}

impl FeedConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = non_blank(&lookup, ENV_USGS_FEED).unwrap_or_else(|| DEFAULT_USGS_FEED.to_string());
        let timeout = parse_positive(
            ENV_FEED_TIMEOUT_SECS,
            non_blank(&lookup, ENV_FEED_TIMEOUT_SECS),
            DEFAULT_FEED_TIMEOUT_SECS,
        )?;
        Ok(Self {
            url,
            timeout: Duration::from_secs(timeout),
        })
    }
}

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            key,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}
