//! Error types for Akasha core operations

use thiserror::Error;

/// Aggregate error type returned by public `Akasha` methods.
#[derive(Error, Debug)]
pub enum AkashaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedding provider error: {0}")]
    Embedding(#[from] EmbeddingFailure),

    #[error("LLM provider error: {0}")]
    Llm(#[from] LLMFailure),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("database error: {0}")]
    Database(#[from] DatabaseFailure),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scope violation: {0}")]
    ScopeViolation(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by an `EmbeddingProvider`.
#[derive(Error, Debug, Clone)]
pub enum EmbeddingFailure {
    #[error("embedding provider failure: {reason}")]
    Failure { reason: String },
}

impl EmbeddingFailure {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// Errors raised by an `LLMProvider`.
#[derive(Error, Debug, Clone)]
pub enum LLMFailure {
    #[error("LLM provider failure: {reason}")]
    Failure { reason: String },
}

impl LLMFailure {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// Raised when an LLM extraction response cannot be parsed as the
/// extraction schema (spec.md §4.6 step 4).
#[derive(Error, Debug, Clone)]
pub enum ExtractionFailure {
    #[error("extraction output could not be parsed: {reason}")]
    ParseFailed { reason: String },

    #[error("extraction output failed validation: {reason}")]
    ValidationFailed { reason: String },
}

/// Errors raised by a `DatabaseProvider`.
#[derive(Error, Debug, Clone)]
pub enum DatabaseFailure {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("backend error: {0}")]
    Other(String),
}

pub type AkashaResult<T> = Result<T, AkashaError>;
pub type EmbeddingResult<T> = Result<T, EmbeddingFailure>;
pub type LLMResult<T> = Result<T, LLMFailure>;
pub type DatabaseResult<T> = Result<T, DatabaseFailure>;
