//! Adapter that bridges the storage layer to the domain layer.
//!
//! The domain layer (lexval-domain) reaches the store through the abstract
//! `EntityReader` trait; the storage layer (lexval-storage) implements
//! `RecordStore` with concrete backends. [`StoreEntityReader`] implements the
//! former on top of the latter, translating entity kinds to collections,
//! relationship kinds to foreign-key links, and storage errors to domain
//! errors.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lexval_domain::error::{DomainError, DomainResult};
use lexval_domain::ids::{EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPair};
use lexval_domain::validator::EntityReader;
use lexval_storage::{Collection, Link, RecordStore, StorageError};

/// Collection holding rows of `kind`.
pub fn collection_for(kind: EntityKind) -> Collection {
    match kind {
        EntityKind::Matter => Collection::Matters,
        EntityKind::Document => Collection::Documents,
        EntityKind::Revision => Collection::Revisions,
    }
}

/// Foreign-key link backing `kind`.
pub fn link_for(kind: RelationshipKind) -> Link {
    match kind {
        RelationshipKind::DocumentMatter => Link::DocumentMatter,
        RelationshipKind::RevisionDocument => Link::RevisionDocument,
    }
}

/// Maps a storage error into the domain taxonomy.
///
/// Timeouts stay timeouts so the orchestrator can report them distinctly;
/// connectivity failures become `StoreUnavailable`; everything else is a
/// failed query.
pub fn map_storage_error(err: StorageError) -> DomainError {
    match err {
        StorageError::QueryTimeout { timeout, .. } => DomainError::Timeout {
            duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
        err if err.is_connectivity() => DomainError::StoreUnavailable {
            message: err.to_string(),
        },
        StorageError::InvalidInput { message } => DomainError::InvalidInput { message },
        err => DomainError::QueryFailed {
            message: err.to_string(),
        },
    }
}

/// `EntityReader` over any `RecordStore`.
pub struct StoreEntityReader<S: RecordStore> {
    storage: Arc<S>,
}

impl<S: RecordStore> StoreEntityReader<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

#[async_trait]
impl<S: RecordStore> EntityReader for StoreEntityReader<S> {
    async fn existing_ids(
        &self,
        kind: EntityKind,
        ids: &IdentifierSet,
    ) -> DomainResult<HashSet<String>> {
        let found = self
            .storage
            .existing_ids(collection_for(kind), ids.as_slice())
            .await
            .map_err(map_storage_error)?;
        Ok(found.into_iter().collect())
    }

    async fn linked_pairs(
        &self,
        kind: RelationshipKind,
        pairs: &PairSet,
    ) -> DomainResult<HashSet<RelationshipPair>> {
        let candidates: Vec<(String, String)> = pairs
            .iter()
            .map(|pair| (pair.parent_id.clone(), pair.child_id.clone()))
            .collect();

        let linked = self
            .storage
            .linked_pairs(link_for(kind), &candidates)
            .await
            .map_err(map_storage_error)?;

        Ok(linked
            .into_iter()
            .map(|(parent_id, child_id)| RelationshipPair::new(parent_id, child_id))
            .collect())
    }

    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> DomainResult<Vec<String>> {
        self.storage
            .matching_file_names(matter_id, file_names)
            .await
            .map_err(map_storage_error)
    }

    async fn probe(&self) -> DomainResult<Duration> {
        let status = self
            .storage
            .health_check()
            .await
            .map_err(map_storage_error)?;
        if status.healthy {
            Ok(status.latency)
        } else {
            Err(DomainError::StoreUnavailable {
                message: status
                    .message
                    .unwrap_or_else(|| "store reported unhealthy".to_string()),
            })
        }
    }
}
