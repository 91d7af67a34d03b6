// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

use crate::error::FetchError;

/// Feed document exactly as the upstream returned it.
///
/// No shape is enforced. Every accessor returns `None` when a key is absent or
/// holds an unexpected JSON type, so loosely-formed feeds never error.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeedDocument(Value);

impl RawFeedDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The `features` list, if the document carries one.
    pub fn features(&self) -> Option<impl Iterator<Item = Feature<'_>>> {
        self.0
            .get("features")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(Feature))
    }
}

impl From<Value> for RawFeedDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Borrowed view of one entry of the `features` list.
#[derive(Debug, Clone, Copy)]
pub struct Feature<'a>(&'a Value);

impl<'a> Feature<'a> {
    pub fn id(&self) -> Option<&'a str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// A key under `properties`.
    pub fn property(&self, key: &str) -> Option<&'a Value> {
        self.0
            .get("properties")
            .and_then(|p| p.get(key))
            .filter(|v| !v.is_null())
    }

    /// `geometry.coordinates`, position for position. Non-numeric slots are `None`.
    pub fn coordinates(&self) -> Option<Vec<Option<f64>>> {
        self.0
            .get("geometry")
            .and_then(|g| g.get("coordinates"))
            .and_then(Value::as_array)
            .map(|items| items.iter().map(Value::as_f64).collect())
    }
}

/// Flattened, pipeline-owned record published for every feature.
///
/// Field names on the wire follow the record format downstream consumers
/// already read: `id`, `time`, `mag`, `place`, `coordinates`, `type`,
/// `processed_time`. Absent values are written as `null`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NormalizedEvent {
    pub id: Option<String>,
    /// Epoch milliseconds, kept as the exact number supplied upstream.
    #[serde(rename = "time")]
    pub observed_at: Option<Number>,
    #[serde(rename = "mag")]
    pub magnitude: Option<f64>,
    #[serde(rename = "place")]
    pub location_label: Option<String>,
    pub coordinates: Option<Vec<Option<f64>>>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    /// When the pipeline touched the record, not when the event occurred.
    #[serde(rename = "processed_time")]
    pub processed_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    /// One retrieval attempt. Never retries internally.
    async fn fetch(&self) -> Result<RawFeedDocument, FetchError>;
    fn name(&self) -> &str;
}
