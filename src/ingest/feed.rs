// src/ingest/feed.rs
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::ingest::types::{FeedFetcher, RawFeedDocument};

pub const USER_AGENT: &str = concat!("quake-bridge/", env!("CARGO_PKG_VERSION"));

/// Retrieves the GeoJSON feed over HTTP with a bounded timeout.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(format!("building http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get_document(&self) -> Result<RawFeedDocument, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/geo+json, application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = resp.bytes().await?;
        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(RawFeedDocument::new(value))
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self) -> Result<RawFeedDocument, FetchError> {
        tracing::info!(url = %self.url, "fetching feed");

        let doc = self.get_document().await?;
        if doc.features().is_none() {
            tracing::debug!(url = %self.url, "feed document has no features list");
        }
        Ok(doc)
    }

    fn name(&self) -> &str {
        "usgs"
    }
}
