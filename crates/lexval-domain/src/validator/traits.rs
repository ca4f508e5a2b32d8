//! Traits for the store operations needed by the validator.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::ids::{EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPair};

/// Read access to the persistent store, as seen by the validator.
///
/// Every method only considers live rows; soft-deleted rows are absent.
/// Implementations are expected to bound their own query time and report
/// an exceeded bound as [`DomainError::Timeout`](crate::error::DomainError::Timeout).
#[async_trait]
pub trait EntityReader: Send + Sync + 'static {
    /// Returns the subset of `ids` that exist for `kind`.
    async fn existing_ids(
        &self,
        kind: EntityKind,
        ids: &IdentifierSet,
    ) -> DomainResult<HashSet<String>>;

    /// Returns the subset of `pairs` whose child row references the parent
    /// through the foreign key of `kind`.
    async fn linked_pairs(
        &self,
        kind: RelationshipKind,
        pairs: &PairSet,
    ) -> DomainResult<HashSet<RelationshipPair>>;

    /// Returns the stored file names of documents in `matter_id` equal to
    /// any of `file_names` ignoring case. Names come back as stored.
    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> DomainResult<Vec<String>>;

    /// Connectivity probe. Returns the observed round-trip latency.
    async fn probe(&self) -> DomainResult<Duration>;
}
