//! Error types for the relay pipeline

use thiserror::Error;

/// Why a captured message was not delivered.
///
/// Every variant is terminal for that message: nothing is retried or queued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected message: {0}")]
    UpstreamRejected(String),
}
