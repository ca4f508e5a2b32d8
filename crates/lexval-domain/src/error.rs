//! Domain error types for validation operations.

use thiserror::Error;

/// Domain-specific errors raised by the query executors.
///
/// None of these reach callers of the engine directly: the orchestrator
/// converts them into timeout outcomes or degraded results.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// The backing store could not be reached.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The backing store rejected or failed a query.
    #[error("query failed: {message}")]
    QueryFailed { message: String },

    /// A store query exceeded its time budget.
    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Malformed input reached an executor.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl DomainError {
    /// Returns true for errors that mean "the time budget ran out".
    pub fn is_timeout(&self) -> bool {
        matches!(self, DomainError::Timeout { .. })
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
