//! Tests for the validation handler.

use super::*;
use async_trait::async_trait;
use lexval_domain::error::{DomainError, DomainResult};
use lexval_domain::ids::{
    EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPair,
};
use lexval_domain::metrics::{ExecutionStrategy, OperationKind};
use lexval_domain::validator::{ConflictType, EntityReader, FileNameRequest};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ValidationOptions;

// ============================================================
// Test Mocks
// ============================================================

/// Decrements the active-query gauge even when the query is cancelled.
struct ActiveQuery<'a>(&'a AtomicUsize);

impl Drop for ActiveQuery<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock reader that counts queries and tracks how many run at once.
#[derive(Default)]
pub struct MockReader {
    entities: HashMap<EntityKind, HashSet<String>>,
    links: HashMap<RelationshipKind, HashSet<RelationshipPair>>,
    file_names: HashMap<String, Vec<String>>,
    delay: Duration,
    failure: Mutex<Option<DomainError>>,
    probe_fails: AtomicBool,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, kind: EntityKind, id: &str) -> Self {
        self.entities.entry(kind).or_default().insert(id.to_string());
        self
    }

    pub fn with_link(mut self, kind: RelationshipKind, parent_id: &str, child_id: &str) -> Self {
        self.links
            .entry(kind)
            .or_default()
            .insert(RelationshipPair::new(parent_id, child_id));
        self
    }

    pub fn with_file_name(mut self, matter_id: &str, file_name: &str) -> Self {
        self.file_names
            .entry(matter_id.to_string())
            .or_default()
            .push(file_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failure(&self, failure: Option<DomainError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn set_probe_fails(&self, fails: bool) {
        self.probe_fails.store(fails, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn query<T>(&self, answer: impl FnOnce() -> T) -> DomainResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveQuery(&self.active);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(answer()),
        }
    }
}

#[async_trait]
impl EntityReader for MockReader {
    async fn existing_ids(
        &self,
        kind: EntityKind,
        ids: &IdentifierSet,
    ) -> DomainResult<HashSet<String>> {
        self.query(|| {
            let known = self.entities.get(&kind);
            ids.iter()
                .filter(|id| known.is_some_and(|known| known.contains(*id)))
                .cloned()
                .collect()
        })
        .await
    }

    async fn linked_pairs(
        &self,
        kind: RelationshipKind,
        pairs: &PairSet,
    ) -> DomainResult<HashSet<RelationshipPair>> {
        self.query(|| {
            let known = self.links.get(&kind);
            pairs
                .iter()
                .filter(|pair| known.is_some_and(|known| known.contains(*pair)))
                .cloned()
                .collect()
        })
        .await
    }

    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> DomainResult<Vec<String>> {
        self.query(|| {
            let wanted: HashSet<String> = file_names.iter().map(|n| n.to_lowercase()).collect();
            self.file_names
                .get(matter_id)
                .map(|stored| {
                    stored
                        .iter()
                        .filter(|name| wanted.contains(&name.to_lowercase()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
        .await
    }

    async fn probe(&self) -> DomainResult<Duration> {
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(DomainError::StoreUnavailable {
                message: "connection refused".to_string(),
            });
        }
        Ok(Duration::from_millis(1))
    }
}

fn options() -> ValidationOptions {
    ValidationOptions {
        max_batch_size: 100,
        parallel_threshold: 4,
        ..ValidationOptions::default()
    }
}

fn handler_with(reader: MockReader, options: ValidationOptions) -> (ValidationHandler<MockReader>, Arc<MockReader>) {
    let reader = Arc::new(reader);
    (
        ValidationHandler::from_options(Arc::clone(&reader), options),
        reader,
    )
}

fn handler(reader: MockReader) -> (ValidationHandler<MockReader>, Arc<MockReader>) {
    handler_with(reader, options())
}

fn ids(values: &[&str]) -> IdentifierSet {
    IdentifierSet::sanitize(values)
}

fn pairs(values: &[(&str, &str)]) -> PairSet {
    PairSet::sanitize(
        values
            .iter()
            .map(|(parent, child)| RelationshipPair::new(*parent, *child)),
    )
}

fn approx_eq(left: f64, right: f64) -> bool {
    (left - right).abs() < 1e-9
}

// ============================================================
// Section 1: Entity Existence
// ============================================================

#[tokio::test]
async fn test_missing_matter_is_reported() {
    // Arrange
    let (handler, _) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    let request = EntityValidationRequest::new().with_matters(["m1", "m2"]);

    // Act
    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(result.existing(EntityKind::Matter), &ids(&["m1"]));
    assert_eq!(result.missing(EntityKind::Matter), &ids(&["m2"]));
    assert!(!result.all_exist());
    assert!(!result.is_degraded());
}

#[tokio::test]
async fn test_empty_request_exists_trivially_without_queries() {
    let (handler, reader) = handler(MockReader::new());

    let result = handler
        .validate_entities_exist(&EntityValidationRequest::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.all_exist());
    assert_eq!(result.entity_count(), 0);
    for kind in EntityKind::ALL {
        assert!(result.existing(kind).is_empty());
        assert!(result.missing(kind).is_empty());
    }
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_only_requested_kinds_are_queried() {
    let (handler, reader) = handler(
        MockReader::new()
            .with_entity(EntityKind::Document, "d1")
            .with_entity(EntityKind::Revision, "r1"),
    );
    let request = EntityValidationRequest::new()
        .with_documents(["d1"])
        .with_revisions(["r1"]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.all_exist());
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_blank_and_duplicate_ids_are_dropped_before_querying() {
    let (handler, _) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    let request = EntityValidationRequest::new().with_matters([
        "m1",
        "",
        "  ",
        "m1",
        "00000000-0000-0000-0000-000000000000",
    ]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.entity_count(), 1);
    assert!(result.all_exist());
}

// ============================================================
// Section 2: Batch Size Enforcement
// ============================================================

#[tokio::test]
async fn test_batch_at_limit_is_accepted() {
    let options = ValidationOptions {
        max_batch_size: 5,
        ..options()
    };
    let (handler, _) = handler_with(MockReader::new(), options);
    let request = EntityValidationRequest::new()
        .with_matters(["m1", "m2", "m3"])
        .with_documents(["d1", "d2"]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_batch_over_limit_is_rejected_without_queries() {
    let options = ValidationOptions {
        max_batch_size: 5,
        ..options()
    };
    let (handler, reader) = handler_with(MockReader::new(), options);
    let request = EntityValidationRequest::new()
        .with_matters(["m1", "m2", "m3"])
        .with_documents(["d1", "d2"])
        .with_revisions(["r1"]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await;

    assert_eq!(
        result.unwrap_err(),
        ValidationError::BatchTooLarge { size: 6, max: 5 }
    );
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_batch_limit_counts_sanitized_ids() {
    let options = ValidationOptions {
        max_batch_size: 2,
        ..options()
    };
    let (handler, _) = handler_with(MockReader::new(), options);
    let request = EntityValidationRequest::new().with_matters(["m1", "m1", "", "m2", "m2"]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await;

    assert!(result.is_ok());
}

// ============================================================
// Section 3: Strategy Selection
// ============================================================

#[tokio::test]
async fn test_below_threshold_runs_sequentially() {
    // Arrange: threshold is 4, request has 3 ids across 3 kinds
    let (handler, reader) = handler(MockReader::new().with_delay(Duration::from_millis(10)));
    let request = EntityValidationRequest::new()
        .with_matters(["m1"])
        .with_documents(["d1"])
        .with_revisions(["r1"]);

    // Act
    handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Sequential), 1);
    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Parallel), 0);
    assert_eq!(reader.calls(), 3);
    assert_eq!(reader.max_active(), 1);
}

#[tokio::test]
async fn test_at_threshold_runs_in_parallel() {
    let (handler, reader) = handler(MockReader::new().with_delay(Duration::from_millis(10)));
    let request = EntityValidationRequest::new()
        .with_matters(["m1", "m2"])
        .with_documents(["d1"])
        .with_revisions(["r1"]);

    handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Parallel), 1);
    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Sequential), 0);
    assert_eq!(reader.calls(), 3);
    assert_eq!(reader.max_active(), 3);
}

#[tokio::test]
async fn test_parallel_disabled_always_runs_sequentially() {
    let options = ValidationOptions {
        enable_parallel_processing: false,
        ..options()
    };
    let (handler, reader) = handler_with(
        MockReader::new().with_delay(Duration::from_millis(5)),
        options,
    );
    let request = EntityValidationRequest::new()
        .with_matters(["m1", "m2", "m3"])
        .with_documents(["d1", "d2"])
        .with_revisions(["r1"]);

    handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Sequential), 1);
    assert_eq!(reader.max_active(), 1);
}

// ============================================================
// Section 4: Caching
// ============================================================

#[tokio::test]
async fn test_repeated_request_is_served_from_cache() {
    // Arrange
    let (handler, reader) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    let request = EntityValidationRequest::new().with_matters(["m1", "m2"]);
    let cancel = CancellationToken::new();

    // Act
    let first = handler.validate_entities_exist(&request, &cancel).await.unwrap();
    let second = handler.validate_entities_exist(&request, &cancel).await.unwrap();

    // Assert
    assert_eq!(first, second);
    assert_eq!(reader.calls(), 1);
    assert_eq!(handler.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_permuted_request_hits_the_same_entry() {
    let (handler, reader) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    let cancel = CancellationToken::new();

    let first = handler
        .validate_entities_exist(&EntityValidationRequest::new().with_matters(["m1", "m2"]), &cancel)
        .await
        .unwrap();
    let second = handler
        .validate_entities_exist(
            &EntityValidationRequest::new().with_matters(["m2", "m1", "m2"]),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_disabled_cache_requeries_every_time() {
    let options = ValidationOptions {
        enable_caching: false,
        ..options()
    };
    let (handler, reader) = handler_with(MockReader::new(), options);
    let request = EntityValidationRequest::new().with_matters(["m1"]);
    let cancel = CancellationToken::new();

    handler.validate_entities_exist(&request, &cancel).await.unwrap();
    handler.validate_entities_exist(&request, &cancel).await.unwrap();

    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_degraded_result_is_not_cached() {
    // Arrange
    let (handler, reader) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    reader.set_failure(Some(DomainError::StoreUnavailable {
        message: "down".to_string(),
    }));
    let request = EntityValidationRequest::new().with_matters(["m1"]);
    let cancel = CancellationToken::new();

    // Act
    let degraded = handler.validate_entities_exist(&request, &cancel).await.unwrap();
    reader.set_failure(None);
    let recovered = handler.validate_entities_exist(&request, &cancel).await.unwrap();

    // Assert
    assert!(degraded.is_degraded());
    assert!(!recovered.is_degraded());
    assert!(recovered.all_exist());
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_clear_cache_forces_requery() {
    let (handler, reader) = handler(MockReader::new());
    let request = EntityValidationRequest::new().with_matters(["m1"]);
    let cancel = CancellationToken::new();

    handler.validate_entities_exist(&request, &cancel).await.unwrap();
    handler.clear_cache().await;
    handler.validate_entities_exist(&request, &cancel).await.unwrap();

    assert_eq!(reader.calls(), 2);
}

// ============================================================
// Section 5: Request Coalescing
// ============================================================

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_query() {
    // Arrange
    let (handler, reader) = handler(
        MockReader::new()
            .with_entity(EntityKind::Matter, "m1")
            .with_delay(Duration::from_millis(50)),
    );
    let request = EntityValidationRequest::new().with_matters(["m1", "m2"]);
    let cancel = CancellationToken::new();

    // Act
    let results = futures::future::join_all(
        (0..5).map(|_| handler.validate_entities_exist(&request, &cancel)),
    )
    .await;

    // Assert
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
    assert_eq!(reader.calls(), 1);
    assert_eq!(handler.tracker().coalesced_count(), 4);
    assert_eq!(handler.metrics().in_flight_requests, 0);
}

#[tokio::test]
async fn test_coalescing_applies_with_caching_disabled() {
    let options = ValidationOptions {
        enable_caching: false,
        ..options()
    };
    let (handler, reader) = handler_with(
        MockReader::new().with_delay(Duration::from_millis(50)),
        options,
    );
    let request = RelationshipValidationRequest::new().with_document_in_matter("m1", "d1");
    let cancel = CancellationToken::new();

    let results = futures::future::join_all(
        (0..3).map(|_| handler.validate_relationships(&request, &cancel)),
    )
    .await;

    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(reader.calls(), 1);
    assert_eq!(handler.tracker().coalesced_count(), 2);
}

// ============================================================
// Section 6: Timeouts and Cancellation
// ============================================================

#[tokio::test]
async fn test_slow_store_times_out_instead_of_reporting_missing() {
    // Arrange
    let options = ValidationOptions {
        batch_timeout: Duration::from_millis(50),
        ..options()
    };
    let (handler, _) = handler_with(
        MockReader::new().with_delay(Duration::from_millis(500)),
        options,
    );
    let request = EntityValidationRequest::new().with_matters(["m1"]);

    // Act
    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await;

    // Assert
    assert_eq!(result.unwrap_err(), ValidationError::Timeout { duration_ms: 50 });
    let stats = handler
        .tracker()
        .operation_stats(OperationKind::EntityValidation)
        .unwrap();
    assert_eq!(stats.total_failures, 1);
    assert_eq!(handler.metrics().in_flight_requests, 0);
    assert_eq!(handler.cache().entry_count(), 0);
}

#[tokio::test]
async fn test_store_timeout_error_surfaces_as_timeout() {
    let (handler, reader) = handler(MockReader::new());
    reader.set_failure(Some(DomainError::Timeout { duration_ms: 30 }));
    let request = EntityValidationRequest::new().with_matters(["m1"]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await;

    assert_eq!(result.unwrap_err(), ValidationError::Timeout { duration_ms: 30 });
}

#[tokio::test]
async fn test_cancelled_token_short_circuits() {
    let (handler, reader) = handler(MockReader::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = handler
        .validate_entities_exist(&EntityValidationRequest::new().with_matters(["m1"]), &cancel)
        .await;

    assert_eq!(result.unwrap_err(), ValidationError::Cancelled);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_reaches_in_flight_queries() {
    let (handler, reader) = handler(MockReader::new().with_delay(Duration::from_secs(5)));
    let request = EntityValidationRequest::new()
        .with_matters(["m1", "m2"])
        .with_documents(["d1", "d2"]);
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(handler.validate_entities_exist(&request, &cancel), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    assert_eq!(result.unwrap_err(), ValidationError::Cancelled);
    assert_eq!(reader.calls(), 2);
    assert_eq!(reader.active.load(Ordering::SeqCst), 0);
}

// ============================================================
// Section 7: Store Failures
// ============================================================

#[tokio::test]
async fn test_store_failure_yields_degraded_all_missing_result() {
    let (handler, reader) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    reader.set_failure(Some(DomainError::StoreUnavailable {
        message: "connection reset".to_string(),
    }));
    let request = EntityValidationRequest::new()
        .with_matters(["m1"])
        .with_documents(["d1"]);

    let result = handler
        .validate_entities_exist(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_degraded());
    assert!(!result.all_exist());
    assert_eq!(result.missing(EntityKind::Matter), &ids(&["m1"]));
    assert_eq!(result.missing(EntityKind::Document), &ids(&["d1"]));
    assert!(result.existing(EntityKind::Matter).is_empty());

    let stats = handler
        .tracker()
        .operation_stats(OperationKind::EntityValidation)
        .unwrap();
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn test_invalid_input_from_store_is_rejected() {
    let (handler, reader) = handler(MockReader::new());
    reader.set_failure(Some(DomainError::InvalidInput {
        message: "malformed id".to_string(),
    }));

    let result = handler
        .validate_entities_exist(
            &EntityValidationRequest::new().with_matters(["m1"]),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(ValidationError::InvalidRequest { .. })
    ));
}

// ============================================================
// Section 8: Relationships
// ============================================================

#[tokio::test]
async fn test_document_under_other_matter_is_invalid() {
    // Arrange: d1 belongs to m2
    let (handler, _) = handler(MockReader::new().with_link(
        RelationshipKind::DocumentMatter,
        "m2",
        "d1",
    ));
    let request = RelationshipValidationRequest::new()
        .with_document_in_matter("m1", "d1")
        .with_document_in_matter("m2", "d1");

    // Act
    let result = handler
        .validate_relationships(&request, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(
        result.invalid(RelationshipKind::DocumentMatter),
        &pairs(&[("m1", "d1")])
    );
    assert_eq!(
        result.valid(RelationshipKind::DocumentMatter),
        &pairs(&[("m2", "d1")])
    );
    assert!(!result.all_valid());
}

#[tokio::test]
async fn test_empty_relationship_request_is_valid_without_queries() {
    let (handler, reader) = handler(MockReader::new());

    let result = handler
        .validate_relationships(&RelationshipValidationRequest::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.all_valid());
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_relationship_store_failure_marks_all_invalid() {
    let (handler, reader) = handler(MockReader::new().with_link(
        RelationshipKind::RevisionDocument,
        "d1",
        "r1",
    ));
    reader.set_failure(Some(DomainError::QueryFailed {
        message: "deadlock".to_string(),
    }));
    let request = RelationshipValidationRequest::new().with_revision_in_document("d1", "r1");

    let result = handler
        .validate_relationships(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_degraded());
    assert_eq!(
        result.invalid(RelationshipKind::RevisionDocument),
        &pairs(&[("d1", "r1")])
    );
}

// ============================================================
// Section 9: Comprehensive Validation
// ============================================================

fn linked_reader() -> MockReader {
    MockReader::new()
        .with_entity(EntityKind::Matter, "m1")
        .with_entity(EntityKind::Document, "d1")
        .with_entity(EntityKind::Revision, "r1")
        .with_link(RelationshipKind::DocumentMatter, "m1", "d1")
        .with_link(RelationshipKind::RevisionDocument, "d1", "r1")
}

#[tokio::test]
async fn test_comprehensive_valid_when_everything_checks_out() {
    let (handler, _) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new()
            .with_matters(["m1"])
            .with_documents(["d1"])
            .with_revisions(["r1"]),
        relationships: Some(
            RelationshipValidationRequest::new()
                .with_document_in_matter("m1", "d1")
                .with_revision_in_document("d1", "r1"),
        ),
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.valid);
    assert!(result.relationships.is_some());
    assert_eq!(result.metadata.entity_count, 3);
    assert_eq!(result.metadata.relationship_count, 2);
    assert_eq!(result.metadata.strategy, ExecutionStrategy::Parallel);
    assert!(!result.metadata.served_from_cache);
    assert!(!result.metadata.degraded);
}

#[tokio::test]
async fn test_comprehensive_without_pairs_skips_relationships() {
    let (handler, reader) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new().with_matters(["m1", "m9"]),
        relationships: None,
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.valid);
    assert!(result.relationships.is_none());
    assert_eq!(result.metadata.strategy, ExecutionStrategy::Sequential);
    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_comprehensive_invalid_when_a_relationship_fails() {
    let (handler, _) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new().with_matters(["m1"]),
        relationships: Some(RelationshipValidationRequest::new().with_revision_in_document("d2", "r1")),
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.entities.all_exist());
    assert!(!result.valid);
}

#[tokio::test]
async fn test_comprehensive_batch_limit_uses_combined_count() {
    let options = ValidationOptions {
        max_batch_size: 5,
        ..options()
    };
    let (handler, reader) = handler_with(linked_reader(), options);
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new().with_matters(["m1", "m2", "m3"]),
        relationships: Some(
            RelationshipValidationRequest::new()
                .with_document_in_matter("m1", "d1")
                .with_document_in_matter("m1", "d2")
                .with_revision_in_document("d1", "r1"),
        ),
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await;

    assert_eq!(
        result.unwrap_err(),
        ValidationError::BatchTooLarge { size: 6, max: 5 }
    );
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_comprehensive_second_call_is_served_from_cache() {
    let (handler, reader) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new().with_documents(["d1"]),
        relationships: Some(RelationshipValidationRequest::new().with_document_in_matter("m1", "d1")),
    };
    let cancel = CancellationToken::new();

    handler.validate_comprehensive(&request, &cancel).await.unwrap();
    let second = handler.validate_comprehensive(&request, &cancel).await.unwrap();

    assert!(second.valid);
    assert!(second.metadata.served_from_cache);
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_comprehensive_parts_run_with_reported_strategy() {
    // Two ids and two pairs: each part alone is below the threshold of 4,
    // the combined request is not.
    let (handler, _) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new().with_matters(["m1", "m2"]),
        relationships: Some(
            RelationshipValidationRequest::new()
                .with_document_in_matter("m1", "d1")
                .with_document_in_matter("m2", "d1"),
        ),
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.strategy, ExecutionStrategy::Parallel);
    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Parallel), 2);
    assert_eq!(handler.tracker().strategy_count(ExecutionStrategy::Sequential), 0);
}

#[tokio::test]
async fn test_comprehensive_pairs_only_is_served_from_cache() {
    let (handler, reader) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new(),
        relationships: Some(RelationshipValidationRequest::new().with_document_in_matter("m1", "d1")),
    };
    let cancel = CancellationToken::new();

    let first = handler.validate_comprehensive(&request, &cancel).await.unwrap();
    let second = handler.validate_comprehensive(&request, &cancel).await.unwrap();

    assert!(!first.metadata.served_from_cache);
    assert!(second.valid);
    assert!(second.metadata.served_from_cache);
    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_comprehensive_empty_request_is_not_served_from_cache() {
    let (handler, reader) = handler(linked_reader());
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new(),
        relationships: None,
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.valid);
    assert!(!result.metadata.served_from_cache);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_comprehensive_reports_degraded_parts() {
    let (handler, reader) = handler(linked_reader());
    reader.set_failure(Some(DomainError::StoreUnavailable {
        message: "down".to_string(),
    }));
    let request = ComprehensiveValidationRequest {
        entities: EntityValidationRequest::new().with_matters(["m1"]),
        relationships: Some(RelationshipValidationRequest::new().with_document_in_matter("m1", "d1")),
    };

    let result = handler
        .validate_comprehensive(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.valid);
    assert!(result.metadata.degraded);
}

// ============================================================
// Section 10: File Names
// ============================================================

#[tokio::test]
async fn test_case_insensitive_file_name_conflict() {
    // Arrange
    let (handler, _) = handler(MockReader::new().with_file_name("m1", "report.PDF"));
    let requests = vec![
        FileNameRequest::new("m1", "Report.pdf"),
        FileNameRequest::new("m1", "Brief.docx"),
    ];

    // Act
    let result = handler
        .validate_file_names(&requests, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert!(result.has_conflicts);
    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.file_name, "Report.pdf");
    assert_eq!(conflict.conflict_type, ConflictType::CaseInsensitiveMatch);
    assert_eq!(conflict.existing_file_name.as_deref(), Some("report.PDF"));
    assert_eq!(result.valid_names, vec![FileNameRequest::new("m1", "Brief.docx")]);
}

#[tokio::test]
async fn test_file_names_are_never_cached() {
    let (handler, reader) = handler(MockReader::new());
    let requests = vec![FileNameRequest::new("m1", "Report.pdf")];
    let cancel = CancellationToken::new();

    handler.validate_file_names(&requests, &cancel).await.unwrap();
    handler.validate_file_names(&requests, &cancel).await.unwrap();

    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_file_name_batch_limit() {
    let options = ValidationOptions {
        max_batch_size: 1,
        ..options()
    };
    let (handler, reader) = handler_with(MockReader::new(), options);
    let requests = vec![
        FileNameRequest::new("m1", "a.pdf"),
        FileNameRequest::new("m1", "b.pdf"),
    ];

    let result = handler
        .validate_file_names(&requests, &CancellationToken::new())
        .await;

    assert_eq!(
        result.unwrap_err(),
        ValidationError::BatchTooLarge { size: 2, max: 1 }
    );
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_file_name_store_timeout_fails_batch() {
    let (handler, reader) = handler(MockReader::new());
    reader.set_failure(Some(DomainError::Timeout { duration_ms: 15 }));

    let result = handler
        .validate_file_names(
            &[FileNameRequest::new("m1", "a.pdf")],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.unwrap_err(), ValidationError::Timeout { duration_ms: 15 });
}

// ============================================================
// Section 11: Metrics, Health and Configuration
// ============================================================

#[tokio::test]
async fn test_metrics_report_covers_operations_and_queries() {
    let (handler, _) = handler(MockReader::new().with_entity(EntityKind::Matter, "m1"));
    let cancel = CancellationToken::new();
    handler
        .validate_entities_exist(&EntityValidationRequest::new().with_matters(["m1"]), &cancel)
        .await
        .unwrap();
    handler
        .validate_entities_exist(&EntityValidationRequest::new().with_matters(["m1"]), &cancel)
        .await
        .unwrap();

    let report = handler.metrics();

    assert_eq!(report.summary.total_operations, 2);
    assert_eq!(report.summary.avg_batch_size, 1.0);
    assert_eq!(report.summary.success_rate, 1.0);
    assert_eq!(report.cache.hits, 1);
    let labels: Vec<&str> = report
        .operations
        .iter()
        .map(|stats| stats.operation.as_str())
        .collect();
    assert!(labels.contains(&"entity_validation"));
    assert!(labels.contains(&"existence_query:matter"));
}

#[tokio::test]
async fn test_healthy_engine_scores_full_marks() {
    let (handler, _) = handler(MockReader::new());

    let report = handler.check_health(&CancellationToken::new()).await;

    assert!(report.healthy);
    assert!(approx_eq(report.score, 1.0));
    assert!(report.issues.is_empty());
    assert_eq!(report.store_latency, Some(Duration::from_millis(1)));
}

#[tokio::test]
async fn test_failed_probe_is_unhealthy_regardless_of_score() {
    let (handler, reader) = handler(MockReader::new());
    reader.set_probe_fails(true);

    let report = handler.check_health(&CancellationToken::new()).await;

    assert!(!report.healthy);
    assert!(approx_eq(report.score, 0.6));
    assert!(report.store_latency.is_none());
    assert!(report.issues[0].starts_with("store connectivity"));
}

#[tokio::test]
async fn test_low_success_rate_costs_score() {
    let (handler, reader) = handler(MockReader::new());
    reader.set_failure(Some(DomainError::StoreUnavailable {
        message: "down".to_string(),
    }));
    let request = EntityValidationRequest::new().with_matters(["m1"]);
    let cancel = CancellationToken::new();
    for _ in 0..10 {
        handler.validate_entities_exist(&request, &cancel).await.unwrap();
    }

    let report = handler.check_health(&cancel).await;

    assert!(approx_eq(report.score, 0.8));
    assert!(report.healthy);
    assert!(report.issues.iter().any(|issue| issue.starts_with("success rate")));
}

#[tokio::test]
async fn test_success_rate_needs_enough_operations() {
    let (handler, reader) = handler(MockReader::new());
    reader.set_failure(Some(DomainError::StoreUnavailable {
        message: "down".to_string(),
    }));
    let request = EntityValidationRequest::new().with_matters(["m1"]);
    let cancel = CancellationToken::new();
    for _ in 0..9 {
        handler.validate_entities_exist(&request, &cancel).await.unwrap();
    }

    let report = handler.check_health(&cancel).await;

    assert!(approx_eq(report.score, 1.0));
}

#[tokio::test]
async fn test_slow_operations_cost_score() {
    let options = ValidationOptions {
        slow_operation_threshold: Duration::from_millis(1),
        ..options()
    };
    let (handler, _) = handler_with(
        MockReader::new().with_delay(Duration::from_millis(20)),
        options,
    );
    handler
        .validate_entities_exist(
            &EntityValidationRequest::new().with_matters(["m1"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let report = handler.check_health(&CancellationToken::new()).await;

    assert!(approx_eq(report.score, 0.85));
    assert!(report.issues.iter().any(|issue| issue.starts_with("average duration")));
}

#[tokio::test]
async fn test_configuration_issues_cost_score_each() {
    let options = ValidationOptions {
        enable_caching: false,
        parallel_threshold: 500,
        ..options()
    };
    let (handler, reader) = handler_with(MockReader::new(), options);
    reader.set_probe_fails(true);

    let report = handler.check_health(&CancellationToken::new()).await;

    assert_eq!(handler.configuration().issues.len(), 2);
    assert!(approx_eq(report.score, 0.4));
    assert!(!report.healthy);
}

#[tokio::test]
async fn test_configuration_reports_options() {
    let (handler, _) = handler(MockReader::new());

    let report = handler.configuration();

    assert_eq!(report.options, options());
    assert!(report.issues.is_empty());
}
