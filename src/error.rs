//! Error taxonomy for the status hub engine.
//!
//! Backend failures are propagated unchanged — no retry, no backoff, no
//! partial-result fallback. Callers surface the error and may re-trigger
//! the whole operation.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// A named query resolved to something that cannot be executed
    /// (a folder, or a query with no WIQL body).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An internal invariant was violated. Indicates a logic defect,
    /// not a recoverable condition.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Transport-level failure talking to the work-item backend.
    #[error("backend request failed: {0}")]
    Backend(#[from] reqwest::Error),

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned {status}: {body}")]
    BackendStatus { status: StatusCode, body: String },
}
