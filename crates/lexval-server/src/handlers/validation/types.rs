//! Request, response and error types for validation operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lexval_domain::cache::CacheStatsSnapshot;
use lexval_domain::ids::{
    EntityIdSets, EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPair,
    RelationshipPairSets,
};
use lexval_domain::metrics::{ExecutionStrategy, OperationStats, TrackerSummary};
use lexval_domain::results::{EntityValidationResult, RelationshipValidationResult};

use crate::config::ValidationOptions;

/// Identifiers whose existence should be checked.
///
/// Inputs may contain blanks, nil UUIDs and duplicates; they are sanitized
/// before anything else happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityValidationRequest {
    #[serde(default)]
    pub matter_ids: Vec<String>,
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub revision_ids: Vec<String>,
}

impl EntityValidationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matters<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matter_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_documents<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_revisions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.revision_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    fn raw(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Matter => &self.matter_ids,
            EntityKind::Document => &self.document_ids,
            EntityKind::Revision => &self.revision_ids,
        }
    }

    /// Sanitized sets for every kind.
    pub fn sanitize(&self) -> EntityIdSets {
        EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, IdentifierSet::sanitize(self.raw(kind))))
            .collect()
    }
}

/// Claimed parent/child links to verify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipValidationRequest {
    /// `(matter_id, document_id)` pairs.
    #[serde(default)]
    pub document_matter: Vec<RelationshipPair>,
    /// `(document_id, revision_id)` pairs.
    #[serde(default)]
    pub revision_document: Vec<RelationshipPair>,
}

impl RelationshipValidationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document_in_matter(
        mut self,
        matter_id: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        self.document_matter
            .push(RelationshipPair::new(matter_id, document_id));
        self
    }

    pub fn with_revision_in_document(
        mut self,
        document_id: impl Into<String>,
        revision_id: impl Into<String>,
    ) -> Self {
        self.revision_document
            .push(RelationshipPair::new(document_id, revision_id));
        self
    }

    fn raw(&self, kind: RelationshipKind) -> &[RelationshipPair] {
        match kind {
            RelationshipKind::DocumentMatter => &self.document_matter,
            RelationshipKind::RevisionDocument => &self.revision_document,
        }
    }

    /// Sanitized pair sets for every kind.
    pub fn sanitize(&self) -> RelationshipPairSets {
        RelationshipKind::ALL
            .into_iter()
            .map(|kind| (kind, PairSet::sanitize(self.raw(kind).iter().cloned())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.document_matter.is_empty() && self.revision_document.is_empty()
    }
}

/// Entity existence plus, optionally, relationship validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComprehensiveValidationRequest {
    #[serde(default)]
    pub entities: EntityValidationRequest,
    /// Relationship validation only runs when this is present and non-empty.
    #[serde(default)]
    pub relationships: Option<RelationshipValidationRequest>,
}

/// How a comprehensive validation was carried out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMetadata {
    pub validated_at: DateTime<Utc>,
    pub duration: Duration,
    /// Strategy chosen from the combined item count; both parts ran with it.
    pub strategy: ExecutionStrategy,
    pub entity_count: usize,
    pub relationship_count: usize,
    /// True when every part came from the cache.
    pub served_from_cache: bool,
    /// True when any part is a store-failure fallback.
    pub degraded: bool,
}

/// Combined outcome of [`ComprehensiveValidationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveValidationResult {
    /// All entities exist and all relationships are valid.
    pub valid: bool,
    pub entities: Arc<EntityValidationResult>,
    pub relationships: Option<Arc<RelationshipValidationResult>>,
    pub metadata: ValidationMetadata,
}

/// Aggregated engine metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMetricsReport {
    pub summary: TrackerSummary,
    pub operations: Vec<OperationStats>,
    pub cache: CacheStatsSnapshot,
    /// Keys currently being computed by a leader request.
    pub in_flight_requests: usize,
}

/// Outcome of [`check_health`](super::ValidationHandler::check_health).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// In `[0, 1]`; 1.0 means no penalty applied.
    pub score: f64,
    pub issues: Vec<String>,
    /// Round-trip of the connectivity probe, absent if it failed.
    pub store_latency: Option<Duration>,
    pub checked_at: DateTime<Utc>,
}

/// The configuration snapshot the handler runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationReport {
    pub options: ValidationOptions,
    pub issues: Vec<String>,
}

/// Errors surfaced to callers of the validation handler.
///
/// Store failures are not errors: they produce degraded results instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The sanitized request exceeds the configured maximum.
    #[error("batch size {size} exceeds maximum allowed {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The request is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The time budget ran out before every sub-query completed. This says
    /// nothing about whether the entities exist.
    #[error("validation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The caller cancelled the operation.
    #[error("validation cancelled")]
    Cancelled,
}

impl ValidationError {
    pub(crate) fn timeout(budget: Duration) -> Self {
        ValidationError::Timeout {
            duration_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Total identifiers across kinds.
pub(crate) fn entity_count(sets: &EntityIdSets) -> usize {
    sets.values().map(IdentifierSet::len).sum()
}

/// Total pairs across kinds.
pub(crate) fn pair_count(sets: &RelationshipPairSets) -> usize {
    sets.values().map(PairSet::len).sum()
}
