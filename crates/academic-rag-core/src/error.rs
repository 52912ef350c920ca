//! Error types shared by the ingestion and query pipelines.

use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the core pipeline and its collaborators.
///
/// Classification fallbacks and empty retrievals are not errors: they are
/// ordinary outcomes (GENERIC chunking, the no-context prompt).
#[derive(Debug, Error)]
pub enum Error {
    /// A page or table could not be parsed. The caller skips the offending
    /// page's table parsing and keeps going.
    #[error("parse error on page {page}: {message}")]
    Parse { page: u32, message: String },

    /// The vector index could not be reached or queried.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding service failed or timed out.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The language model did not answer within its timeout.
    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// The language model failed in a way that may clear up: a 5xx, a
    /// rate limit or a dropped connection.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The language model refused the request or answered with something
    /// unusable. Sending it again will not help.
    #[error("generation rejected: {0}")]
    GenerationRejected(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationTimeout(_) | Self::Generation(_) | Self::Embedding(_)
        )
    }
}
