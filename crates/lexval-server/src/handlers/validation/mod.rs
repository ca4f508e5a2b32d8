//! Batch validation of matters, documents and revisions.
//!
//! The handler answers "do these entities exist" and "are these links real"
//! for whole batches at a time, keeping store round-trips low through:
//!
//! 1. **Caching**: results for an identical (order-insensitive) request are
//!    reused until their TTL runs out
//! 2. **Singleflight**: concurrent identical requests that miss the cache
//!    share a single store query
//! 3. **Strategy selection**: large batches query each entity kind
//!    concurrently, small ones query them one after another
//!
//! Every operation runs under a time budget and honours a caller-supplied
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Store
//! failures produce degraded results instead of errors.

mod handler;
mod singleflight;
mod strategy;
mod types;

pub use handler::{ValidationHandler, HEALTHY_SCORE_THRESHOLD};
pub use strategy::select_strategy;
pub use types::{
    ComprehensiveValidationRequest, ComprehensiveValidationResult, ConfigurationReport,
    EntityValidationRequest, HealthReport, RelationshipValidationRequest, ValidationError,
    ValidationMetadata, ValidationMetricsReport, ValidationResult,
};

#[cfg(test)]
mod tests;
