// src/publish/batch.rs
//! Event Hubs batch encoding and size-bounded splitting.
//!
//! A batch body is a JSON array of `{"Body": "<event json>"}` entries, one per
//! message. Splitting keeps the encoded array under the configured byte limit
//! and never reorders entries.

use serde::Serialize;

use crate::error::PublishError;
use crate::ingest::types::NormalizedEvent;

pub const CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(rename = "Body")]
    body: &'a str,
}

/// One serialized entry per event, in input order.
pub fn encode_messages(events: &[NormalizedEvent]) -> Result<Vec<Vec<u8>>, PublishError> {
    events
        .iter()
        .map(|ev| -> Result<Vec<u8>, PublishError> {
            let text = serde_json::to_string(ev)?;
            Ok(serde_json::to_vec(&WireMessage { body: &text })?)
        })
        .collect()
}

/// Pack entries into JSON array bodies no larger than `limit` bytes.
///
/// Fails before producing anything if a single entry cannot fit on its own.
pub fn split_batches(entries: Vec<Vec<u8>>, limit: usize) -> Result<Vec<Vec<u8>>, PublishError> {
    if let Some((index, entry)) = entries
        .iter()
        .enumerate()
        .find(|(_, e)| array_len(e.len(), 1) > limit)
    {
        return Err(PublishError::EventTooLarge {
            index,
            size: array_len(entry.len(), 1),
            limit,
        });
    }

    let mut batches = Vec::new();
    let mut current: Vec<Vec<u8>> = Vec::new();
    let mut current_bytes = 0usize;

    for entry in entries {
        let grown = array_len(current_bytes + entry.len(), current.len() + 1);
        if !current.is_empty() && grown > limit {
            batches.push(join(std::mem::take(&mut current)));
            current_bytes = 0;
        }
        current_bytes += entry.len();
        current.push(entry);
    }
    if !current.is_empty() {
        batches.push(join(current));
    }
    Ok(batches)
}

/// Encoded size of an array holding `count` entries totalling `payload` bytes.
fn array_len(payload: usize, count: usize) -> usize {
    2 + payload + count.saturating_sub(1)
}

fn join(entries: Vec<Vec<u8>>) -> Vec<u8> {
    let payload: usize = entries.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(array_len(payload, entries.len()));
    out.push(b'[');
    for (i, e) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(&e);
    }
    out.push(b']');
    out
}
