//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record not found (or soft-deleted).
    #[error("{collection} record not found: {id}")]
    RecordNotFound { collection: String, id: String },

    /// Record already exists.
    #[error("{collection} record already exists: {id}")]
    RecordAlreadyExists { collection: String, id: String },

    /// Parent record referenced by a new record does not exist.
    #[error("parent {collection} record not found: {id}")]
    ParentNotFound { collection: String, id: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Query exceeded its time budget.
    #[error("query '{operation}' timed out after {timeout:?}")]
    QueryTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Connectivity probe failed.
    #[error("health check failed: {message}")]
    HealthCheckFailed { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true if the error indicates the backend could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionError { .. } | StorageError::HealthCheckFailed { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Connection pool statistics reported by database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the backend answered the probe.
    pub healthy: bool,
    /// Round-trip latency of the probe.
    pub latency: Duration,
    /// Pool statistics (None for backends without a pool).
    pub pool_stats: Option<PoolStats>,
    /// Backend identification.
    pub message: Option<String>,
}
