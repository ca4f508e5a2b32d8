//! lexval-domain: Core validation domain logic
//!
//! This crate contains the building blocks of the batch entity and
//! relationship validation engine:
//! - Identifier sanitizing and the closed set of entity/relationship kinds
//! - Immutable validation result types
//! - Validation result caching with per-entry TTL
//! - Rolling operation metrics and the inputs to health scoring
//! - Existence, relationship and file-name query executors
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                lexval-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  ids.rs      - Sanitizer & entity kinds     │
//! │  results.rs  - Validation result types      │
//! │  cache/      - Validation result caching    │
//! │  metrics/    - Rolling performance windows  │
//! │  validator/  - Store query executors        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod results;
pub mod validator;

#[cfg(test)]
mod ids_proptest;

// Re-export commonly used types at the crate root
pub use cache::{
    CacheKey, CacheStatsSnapshot, CachedValue, ValidationCache, ValidationCacheConfig,
};
pub use error::{DomainError, DomainResult};
pub use ids::{
    EntityIdSets, EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPair,
    RelationshipPairSets,
};
pub use metrics::{ExecutionStrategy, OperationKind, OperationStats, PerformanceTracker, TrackerSummary};
pub use results::{
    EntityValidationResult, ExistenceOutcome, PairOutcome, RelationshipValidationResult,
};
pub use validator::{
    ConflictType, EntityReader, FileNameConflict, FileNameRequest, FileNameValidationResult,
    QueryExecutor,
};
