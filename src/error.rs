// src/error.rs
//! Typed failures for each stage of a poll cycle.
//!
//! Fetch and publish failures are recovered by the loop (the next tick is the
//! retry). Only `ConfigError` is allowed to stop the process, and only at startup.

use reqwest::StatusCode;

/// Startup configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Why the upstream feed could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("feed request timed out: {0}")]
    Timeout(String),

    #[error("feed transport error: {0}")]
    Transport(String),

    #[error("feed returned HTTP {status}")]
    Status { status: StatusCode },

    #[error("feed body is not valid JSON: {0}")]
    Decode(String),
}

impl FetchError {
    /// Short label used for the `reason` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Failure to obtain a bearer token from the managed identity endpoint.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("building identity http client: {0}")]
    Client(String),

    #[error("identity endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("identity endpoint returned HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("identity response missing access_token: {0}")]
    Malformed(String),
}

/// Why a batch could not be handed to the event hub.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("refusing to publish an empty batch")]
    EmptyBatch,

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("event hub connection error: {0}")]
    Connection(String),

    #[error("event hub rejected credentials (HTTP {status})")]
    Unauthorized { status: StatusCode },

    #[error("event hub is throttling or over capacity (HTTP {status})")]
    Capacity { status: StatusCode },

    #[error("event hub returned HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("event {index} encodes to {size} bytes, above the {limit} byte batch limit")]
    EventTooLarge {
        index: usize,
        size: usize,
        limit: usize,
    },

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    /// Short label used for the `reason` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty",
            Self::Credential(_) => "credential",
            Self::Connection(_) => "connection",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Capacity { .. } => "capacity",
            Self::Rejected { .. } => "rejected",
            Self::EventTooLarge { .. } => "too_large",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Map a non-success Event Hubs response onto the failure taxonomy.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized { status },
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                Self::Capacity { status }
            }
            _ => Self::Rejected { status, body },
        }
    }
}
