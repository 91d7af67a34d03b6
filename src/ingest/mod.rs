// src/ingest/mod.rs
pub mod feed;
pub mod scheduler;
pub mod transform;
pub mod types;

use crate::error::FetchError;
use crate::ingest::types::{FeedFetcher, NormalizedEvent};

/// Fetch once and normalize, without publishing.
pub async fn fetch_and_transform(
    fetcher: &dyn FeedFetcher,
) -> Result<Vec<NormalizedEvent>, FetchError> {
    let doc = fetcher.fetch().await?;
    Ok(transform::transform(Some(&doc)))
}
