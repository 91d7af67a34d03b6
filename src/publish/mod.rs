// src/publish/mod.rs
pub mod batch;
pub mod credential;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;

use crate::config::BridgeConfig;
use crate::error::PublishError;
use crate::ingest::types::NormalizedEvent;
use crate::publish::credential::{TokenCredential, EVENTHUBS_RESOURCE};

/// What a successful publish call delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub events: usize,
    pub batches: usize,
}

#[async_trait]
pub trait BatchPublisher: Send + Sync {
    /// Hand a non-empty set of events to the stream as one logical batch.
    async fn publish(&self, events: &[NormalizedEvent]) -> Result<PublishReport, PublishError>;
    fn name(&self) -> &str;
}

/// Publishes to an Event Hub through its REST send endpoint.
pub struct EventHubPublisher {
    send_url: String,
    max_batch_bytes: usize,
    credential: Arc<dyn TokenCredential>,
    http: reqwest::Client,
}

impl EventHubPublisher {
    pub fn new(
        send_url: impl Into<String>,
        max_batch_bytes: usize,
        timeout: Duration,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(crate::ingest::feed::USER_AGENT)
            .build()
            .map_err(|e| PublishError::Connection(format!("building http client: {e}")))?;
        Ok(Self {
            send_url: send_url.into(),
            max_batch_bytes,
            credential,
            http,
        })
    }

    pub fn from_config(
        cfg: &BridgeConfig,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, PublishError> {
        Self::new(
            cfg.eventhub_send_url(),
            cfg.max_batch_bytes,
            cfg.publish_timeout,
            credential,
        )
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    /// Open a producer scoped to a single publish call.
    async fn open_session(&self) -> Result<ProducerSession<'_>, PublishError> {
        let token = self.credential.token(EVENTHUBS_RESOURCE).await?;
        tracing::debug!(url = %self.send_url, "producer session opened");
        Ok(ProducerSession {
            http: &self.http,
            url: &self.send_url,
            bearer: format!("Bearer {}", token.token),
            sent: 0,
        })
    }
}

/// Per-call producer. Dropping it releases the token on every exit path.
struct ProducerSession<'a> {
    http: &'a reqwest::Client,
    url: &'a str,
    bearer: String,
    sent: usize,
}

impl ProducerSession<'_> {
    async fn send(&mut self, body: Vec<u8>) -> Result<(), PublishError> {
        let resp = self
            .http
            .post(self.url)
            .header(reqwest::header::AUTHORIZATION, &self.bearer)
            .header(reqwest::header::CONTENT_TYPE, batch::CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status, body));
        }
        self.sent += 1;
        counter!("bridge_batches_sent_total").increment(1);
        Ok(())
    }
}

impl Drop for ProducerSession<'_> {
    fn drop(&mut self) {
        tracing::debug!(batches_sent = self.sent, "producer session closed");
    }
}

#[async_trait]
impl BatchPublisher for EventHubPublisher {
    async fn publish(&self, events: &[NormalizedEvent]) -> Result<PublishReport, PublishError> {
        if events.is_empty() {
            return Err(PublishError::EmptyBatch);
        }

        let entries = batch::encode_messages(events)?;
        let bodies = batch::split_batches(entries, self.max_batch_bytes)?;
        let total = bodies.len();

        let mut session = self.open_session().await?;
        for (i, body) in bodies.into_iter().enumerate() {
            tracing::debug!(batch = i + 1, of = total, bytes = body.len(), "sending batch");
            if let Err(e) = session.send(body).await {
                tracing::warn!(batch = i + 1, of = total, error = %e, "batch send failed");
                return Err(e);
            }
        }

        counter!("bridge_events_published_total").increment(events.len() as u64);
        Ok(PublishReport {
            events: events.len(),
            batches: total,
        })
    }

    fn name(&self) -> &str {
        "eventhub"
    }
}
