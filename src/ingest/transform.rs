// src/ingest/transform.rs
//! Feature → `NormalizedEvent` mapping. Pure apart from the clock.

use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

use crate::ingest::types::{Feature, NormalizedEvent, RawFeedDocument};

/// Flatten every feature of `doc`, stamping `processed_at` with the current UTC time.
pub fn transform(doc: Option<&RawFeedDocument>) -> Vec<NormalizedEvent> {
    transform_with(doc, Utc::now)
}

/// Same as [`transform`] with an explicit clock, called once per record.
pub fn transform_with<C>(doc: Option<&RawFeedDocument>, mut clock: C) -> Vec<NormalizedEvent>
where
    C: FnMut() -> DateTime<Utc>,
{
    let Some(features) = doc.and_then(RawFeedDocument::features) else {
        return Vec::new();
    };
    features.map(|f| normalize_feature(f, clock())).collect()
}

pub fn normalize_feature(feature: Feature<'_>, processed_at: DateTime<Utc>) -> NormalizedEvent {
    NormalizedEvent {
        id: feature.id().map(str::to_string),
        observed_at: feature.property("time").and_then(epoch_number),
        magnitude: feature.property("mag").and_then(Value::as_f64),
        location_label: string_prop(&feature, "place"),
        coordinates: feature.coordinates(),
        category: string_prop(&feature, "type"),
        processed_at,
    }
}

/// Any JSON number is copied as-is, integer or float.
fn epoch_number(v: &Value) -> Option<Number> {
    match v {
        Value::Number(n) => Some(n.clone()),
        _ => None,
    }
}

fn string_prop(feature: &Feature<'_>, key: &str) -> Option<String> {
    feature
        .property(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}
