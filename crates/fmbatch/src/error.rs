//! Error types surfaced by batching, scheduling and inference.

use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the batchers and the [`Orchestrator`](crate::orchestrator::Orchestrator).
#[derive(Error, Debug)]
pub enum Error {
    /// A value could not be interpreted as a completion or ranked query.
    #[error("unsupported query type: {type_name}")]
    UnsupportedQueryType { type_name: String },

    /// A ranked query must carry at least one candidate.
    #[error("ranked query has no candidates")]
    EmptyCandidates,

    /// The response sequence handed to a reorder does not cover the recorded permutation.
    #[error("cannot reorder {actual} responses against a permutation of length {expected}")]
    ReorderLengthMismatch { expected: usize, actual: usize },

    /// A record of the wrong kind reached the merge step.
    #[error("record {index} is a {found} record, expected {expected}")]
    RecordMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// A run mixes completion and ranked queries, so some query cannot run in the selected mode.
    #[error("query {index} cannot run in {mode} mode")]
    ModeMismatch {
        index: usize,
        mode: crate::inference::Mode,
    },

    /// An encode run produced a response without an embedding.
    #[error("response {index} carries no embedding")]
    MissingEmbedding { index: usize },

    /// The backend kept running out of device memory after every shrink.
    #[error("resource exhaustion persisted after {attempts} attempts: {message}")]
    ResourceExhaustion { attempts: u32, message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Any other inference failure, propagated unchanged.
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Error::InvalidConfig {
            message: format!("required field not set: {}", err),
        }
    }
}

/// Failure channel of an inference backend.
///
/// Out-of-memory conditions are reported as [`InferenceError::ResourceExhausted`] so the
/// scheduler can shrink and retry; everything else is fatal for the run.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("backend ran out of device memory: {message}")]
    ResourceExhausted { message: String },

    #[error("backend does not support {mode} mode")]
    Unsupported { mode: crate::inference::Mode },

    #[error("backend returned {actual} records for a batch of {expected}")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl InferenceError {
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        InferenceError::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Whether this failure may be recovered by shrinking the batches.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, InferenceError::ResourceExhausted { .. })
    }
}
