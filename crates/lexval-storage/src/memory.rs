//! In-memory storage implementation for testing and local runs.
//!
//! Each collection is a `DashMap` keyed by record id, so concurrent readers
//! never contend on a global lock. Soft-deleted rows are kept in the maps
//! and filtered out at query time, mirroring the SQL backends.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::traits::{
    canonical_record_id, validate_file_name, Collection, DocumentRecord, Link, MatterRecord,
    RecordStore, RevisionRecord,
};

/// In-memory implementation of RecordStore.
///
/// # Performance Characteristics
///
/// - **existing_ids**: O(K) where K is the number of requested ids
/// - **linked_pairs**: O(K) where K is the number of requested pairs
/// - **matching_file_names**: O(N) where N is the number of documents
///
/// Latency and outage simulation let callers exercise timeout and
/// degraded paths without a real database.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    matters: DashMap<String, MatterRecord>,
    documents: DashMap<String, DocumentRecord>,
    revisions: DashMap<String, RevisionRecord>,
    /// Artificial delay applied to every query.
    latency: Option<Duration>,
    /// When set, every query fails with a connection error.
    unavailable: AtomicBool,
}

impl MemoryRecordStore {
    /// Creates a new in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory record store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Adds an artificial delay to every query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggles simulated backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn before_query(&self) -> StorageResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError {
                message: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn is_live(&self, collection: Collection, id: &str) -> bool {
        match collection {
            Collection::Matters => self
                .matters
                .get(id)
                .is_some_and(|m| m.deleted_at.is_none()),
            Collection::Documents => self
                .documents
                .get(id)
                .is_some_and(|d| d.deleted_at.is_none()),
            Collection::Revisions => self
                .revisions
                .get(id)
                .is_some_and(|r| r.deleted_at.is_none()),
        }
    }

    /// Parent id of a live child row, if any.
    fn live_parent_of(&self, link: Link, child_id: &str) -> Option<String> {
        match link {
            Link::DocumentMatter => self
                .documents
                .get(child_id)
                .filter(|d| d.deleted_at.is_none())
                .map(|d| d.matter_id.clone()),
            Link::RevisionDocument => self
                .revisions
                .get(child_id)
                .filter(|r| r.deleted_at.is_none())
                .map(|r| r.document_id.clone()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn existing_ids(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> StorageResult<Vec<String>> {
        self.before_query().await?;

        let mut seen: HashSet<&str> = HashSet::with_capacity(ids.len());
        let mut existing = Vec::new();
        for id in ids {
            if seen.insert(id.as_str()) && self.is_live(collection, id) {
                existing.push(id.clone());
            }
        }
        Ok(existing)
    }

    #[instrument(skip(self, pairs), fields(count = pairs.len()))]
    async fn linked_pairs(
        &self,
        link: Link,
        pairs: &[(String, String)],
    ) -> StorageResult<Vec<(String, String)>> {
        self.before_query().await?;

        let mut seen: HashSet<&(String, String)> = HashSet::with_capacity(pairs.len());
        let mut linked = Vec::new();
        for pair in pairs {
            if !seen.insert(pair) {
                continue;
            }
            let (parent_id, child_id) = pair;
            if self.live_parent_of(link, child_id).as_deref() == Some(parent_id.as_str()) {
                linked.push(pair.clone());
            }
        }
        Ok(linked)
    }

    #[instrument(skip(self, file_names), fields(count = file_names.len()))]
    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> StorageResult<Vec<String>> {
        self.before_query().await?;

        let wanted: HashSet<String> = file_names.iter().map(|n| n.to_lowercase()).collect();
        let mut matches: Vec<String> = self
            .documents
            .iter()
            .filter(|d| d.deleted_at.is_none() && d.matter_id == matter_id)
            .filter(|d| wanted.contains(&d.file_name.to_lowercase()))
            .map(|d| d.file_name.clone())
            .collect();

        // Sort for deterministic results (matches Postgres ORDER BY)
        matches.sort();
        Ok(matches)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::HealthCheckFailed {
                message: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(HealthStatus {
            healthy: true,
            latency: Duration::ZERO,
            pool_stats: None, // No connection pool for in-memory storage
            message: Some("in-memory storage".to_string()),
        })
    }

    async fn create_matter(&self, mut matter: MatterRecord) -> StorageResult<()> {
        matter.id = canonical_record_id(&matter.id)?;

        // Use atomic entry API to prevent race condition between check and insert
        match self.matters.entry(matter.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::RecordAlreadyExists {
                collection: Collection::Matters.to_string(),
                id: matter.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(matter);
                Ok(())
            }
        }
    }

    async fn create_document(&self, mut document: DocumentRecord) -> StorageResult<()> {
        document.id = canonical_record_id(&document.id)?;
        document.matter_id = canonical_record_id(&document.matter_id)?;
        validate_file_name(&document.file_name)?;

        if !self.is_live(Collection::Matters, &document.matter_id) {
            return Err(StorageError::ParentNotFound {
                collection: Collection::Matters.to_string(),
                id: document.matter_id,
            });
        }

        match self.documents.entry(document.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::RecordAlreadyExists {
                collection: Collection::Documents.to_string(),
                id: document.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(document);
                Ok(())
            }
        }
    }

    async fn create_revision(&self, mut revision: RevisionRecord) -> StorageResult<()> {
        revision.id = canonical_record_id(&revision.id)?;
        revision.document_id = canonical_record_id(&revision.document_id)?;

        if !self.is_live(Collection::Documents, &revision.document_id) {
            return Err(StorageError::ParentNotFound {
                collection: Collection::Documents.to_string(),
                id: revision.document_id,
            });
        }

        match self.revisions.entry(revision.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::RecordAlreadyExists {
                collection: Collection::Revisions.to_string(),
                id: revision.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(revision);
                Ok(())
            }
        }
    }

    async fn soft_delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        let id = canonical_record_id(id)?;
        let id = id.as_str();
        let now = Utc::now();
        let deleted = match collection {
            Collection::Matters => self.matters.get_mut(id).and_then(|mut m| {
                m.deleted_at.is_none().then(|| m.deleted_at = Some(now))
            }),
            Collection::Documents => self.documents.get_mut(id).and_then(|mut d| {
                d.deleted_at.is_none().then(|| d.deleted_at = Some(now))
            }),
            Collection::Revisions => self.revisions.get_mut(id).and_then(|mut r| {
                r.deleted_at.is_none().then(|| r.deleted_at = Some(now))
            }),
        };

        deleted.ok_or_else(|| StorageError::RecordNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}
