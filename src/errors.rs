//! Structured error taxonomy for the collection pipeline
//!
//! Two families: `RiotApiError` covers everything that can go wrong talking
//! to the match-history API, `CollectError` covers the bulk/backfill
//! pipeline. Transient API failures are retried inside the client; permanent
//! ones surface immediately. Per-item pipeline failures are isolated by the
//! job and never abort a run.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiotApiError {
    /// Transport-level failure (DNS, connect, timeout). Retried by the client.
    #[error("network error calling {endpoint}: {detail}")]
    Network { endpoint: String, detail: String },

    /// HTTP 429 after the retry budget was spent
    #[error("rate limited on {endpoint}, retry after {retry_after:?}")]
    RateLimited {
        endpoint: String,
        retry_after: Duration,
    },

    /// A previous 429 put the client in cooldown; calls fail fast until it ends
    #[error("rate limit cooldown active for another {remaining:?}")]
    CooldownActive { remaining: Duration },

    /// Permanent HTTP failure (4xx other than 404/429, or 5xx after retries)
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// 404 on a point lookup; callers typically skip the item
    #[error("not found: {endpoint}")]
    NotFound { endpoint: String },

    /// Response body did not match the expected shape
    #[error("failed to decode {endpoint} response: {detail}")]
    Parse { endpoint: String, detail: String },
}

impl RiotApiError {
    /// Whether the client is allowed to retry the call that produced this error
    pub fn is_transient(&self) -> bool {
        match self {
            RiotApiError::Network { .. } => true,
            RiotApiError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Api(#[from] RiotApiError),

    /// One match or timeline had an unexpected shape; the item is skipped
    #[error("malformed telemetry in {match_id}: {detail}")]
    MalformedTelemetry { match_id: String, detail: String },

    /// An on-disk checkpoint exists but was written by a different run
    #[error("checkpoint parameters do not match the requested run: {detail}")]
    CheckpointMismatch { detail: String },

    #[error("checkpoint io: {0}")]
    CheckpointIo(#[from] std::io::Error),

    #[error("checkpoint encoding: {0}")]
    CheckpointEncoding(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(#[from] crate::store::StoreError),
}
