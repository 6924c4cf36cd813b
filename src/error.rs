//! Error types for the mindmap synthesis pipeline.

use crate::types::NodeId;
use thiserror::Error;

/// Failures from the external Generation Service.
///
/// Every variant is considered transient at the call site: the retrier will
/// re-attempt the call until its budget is spent, then escalate to
/// [`PipelineError::ExhaustedRetries`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("service error: {0}")]
    Other(String),
}

/// Storage-related errors for the artifact cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact codec error: {0}")]
    Codec(String),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A service call failed on every attempt of its retry budget.
    ///
    /// Fatal to the phase containing the call: the orchestrator halts the
    /// run, but artifacts written by earlier stages remain valid.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("node not found in tree: {0}")]
    NodeNotFound(NodeId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stage failed: {0}")]
    StageFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
