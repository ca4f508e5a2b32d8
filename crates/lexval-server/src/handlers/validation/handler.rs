//! Validation handler implementation.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use lexval_domain::cache::{CacheKey, CachedValue, ValidationCache, ValidationCacheConfig};
use lexval_domain::error::DomainError;
use lexval_domain::ids::{
    EntityIdSets, EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPairSets,
};
use lexval_domain::metrics::{ExecutionStrategy, OperationKind, PerformanceTracker};
use lexval_domain::results::{
    EntityValidationResult, ExistenceOutcome, PairOutcome, RelationshipValidationResult,
};
use lexval_domain::validator::{
    EntityReader, FileNameRequest, FileNameValidationResult, QueryExecutor,
};

use super::singleflight::{Singleflight, SingleflightGuard, SingleflightSlot};
use super::strategy::select_strategy;
use super::types::{
    entity_count, pair_count, ComprehensiveValidationRequest, ComprehensiveValidationResult,
    ConfigurationReport, EntityValidationRequest, HealthReport, RelationshipValidationRequest,
    ValidationError, ValidationMetadata, ValidationMetricsReport, ValidationResult,
};
use crate::config::ValidationOptions;

const STORE_PROBE_PENALTY: f64 = 0.4;
const LOW_SUCCESS_RATE_PENALTY: f64 = 0.2;
const SLOW_OPERATIONS_PENALTY: f64 = 0.15;
const CONFIGURATION_ISSUE_PENALTY: f64 = 0.1;
const CACHE_MALFUNCTION_PENALTY: f64 = 0.1;

/// Below this score the engine reports itself unhealthy.
pub const HEALTHY_SCORE_THRESHOLD: f64 = 0.7;
const MIN_SUCCESS_RATE: f64 = 0.95;
/// Success rate is only judged once this many operations are in the window.
const MIN_OPERATIONS_FOR_SUCCESS_RATE: u64 = 10;

static EMPTY_IDS: IdentifierSet = IdentifierSet::new();
static EMPTY_PAIRS: PairSet = PairSet::new();

/// Outcome shared between coalesced requests.
type Flight<T> = ValidationResult<Arc<T>>;

/// Results that can live in the validation cache.
trait CachedResult: Send + Sync + 'static {
    fn from_cached(value: CachedValue) -> Option<Arc<Self>>;
    fn into_cached(value: Arc<Self>) -> CachedValue;
    fn is_degraded(&self) -> bool;
}

impl CachedResult for EntityValidationResult {
    fn from_cached(value: CachedValue) -> Option<Arc<Self>> {
        match value {
            CachedValue::Entities(result) => Some(result),
            CachedValue::Relationships(_) => None,
        }
    }

    fn into_cached(value: Arc<Self>) -> CachedValue {
        CachedValue::Entities(value)
    }

    fn is_degraded(&self) -> bool {
        EntityValidationResult::is_degraded(self)
    }
}

impl CachedResult for RelationshipValidationResult {
    fn from_cached(value: CachedValue) -> Option<Arc<Self>> {
        match value {
            CachedValue::Relationships(result) => Some(result),
            CachedValue::Entities(_) => None,
        }
    }

    fn into_cached(value: Arc<Self>) -> CachedValue {
        CachedValue::Relationships(value)
    }

    fn is_degraded(&self) -> bool {
        RelationshipValidationResult::is_degraded(self)
    }
}

/// Converts an executor error that must not be hidden behind a degraded
/// result.
fn escalate(err: DomainError) -> ValidationError {
    match err {
        DomainError::Timeout { duration_ms } => ValidationError::Timeout { duration_ms },
        DomainError::InvalidInput { message } => ValidationError::InvalidRequest { message },
        other => ValidationError::InvalidRequest {
            message: other.to_string(),
        },
    }
}

/// Batch validation engine.
///
/// Every top-level operation goes through the same pipeline:
/// sanitize, enforce the batch size, consult the cache, coalesce with any
/// identical in-flight request, pick a strategy and query the store within
/// the time budget. Store failures degrade the result instead of failing the
/// call; timeouts and cancellation are reported as errors.
///
/// The cache and tracker are injected so several handlers (or tests) can
/// share or inspect them.
pub struct ValidationHandler<R: EntityReader> {
    executor: QueryExecutor<R>,
    cache: Arc<ValidationCache>,
    tracker: Arc<PerformanceTracker>,
    options: ValidationOptions,
    entity_flights: Singleflight<CacheKey, Flight<EntityValidationResult>>,
    relationship_flights: Singleflight<CacheKey, Flight<RelationshipValidationResult>>,
}

impl<R: EntityReader> ValidationHandler<R> {
    pub fn new(
        reader: Arc<R>,
        cache: Arc<ValidationCache>,
        tracker: Arc<PerformanceTracker>,
        options: ValidationOptions,
    ) -> Self {
        Self {
            executor: QueryExecutor::new(reader, Arc::clone(&tracker)),
            cache,
            tracker,
            options,
            entity_flights: Singleflight::new(),
            relationship_flights: Singleflight::new(),
        }
    }

    /// Builds the cache and tracker from `options`.
    pub fn from_options(reader: Arc<R>, options: ValidationOptions) -> Self {
        let cache = ValidationCache::new(
            ValidationCacheConfig::default()
                .with_enabled(options.enable_caching)
                .with_max_capacity(options.cache_max_capacity)
                .with_ttl(options.cache_expiration),
        );
        let tracker = PerformanceTracker::new(options.metrics_window);
        Self::new(reader, Arc::new(cache), Arc::new(tracker), options)
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    // ------------------------------------------------------------------
    // Top-level operations
    // ------------------------------------------------------------------

    /// Checks which of the requested matters, documents and revisions exist.
    #[instrument(skip_all, name = "validate_entities_exist")]
    pub async fn validate_entities_exist(
        &self,
        request: &EntityValidationRequest,
        cancel: &CancellationToken,
    ) -> ValidationResult<Arc<EntityValidationResult>> {
        let sets = request.sanitize();
        let count = entity_count(&sets);
        self.check_batch_size(count)?;

        let start = Instant::now();
        let outcome = self
            .with_budget(
                cancel,
                self.resolve_entities(&sets, select_strategy(count, &self.options)),
            )
            .await
            .map(|(result, _)| result);

        let success = matches!(&outcome, Ok(result) if !result.is_degraded());
        self.record(OperationKind::EntityValidation, start, success, count);
        outcome
    }

    /// Verifies claimed document-in-matter and revision-in-document links.
    #[instrument(skip_all, name = "validate_relationships")]
    pub async fn validate_relationships(
        &self,
        request: &RelationshipValidationRequest,
        cancel: &CancellationToken,
    ) -> ValidationResult<Arc<RelationshipValidationResult>> {
        let sets = request.sanitize();
        let count = pair_count(&sets);
        self.check_batch_size(count)?;

        let start = Instant::now();
        let outcome = self
            .with_budget(
                cancel,
                self.resolve_relationships(&sets, select_strategy(count, &self.options)),
            )
            .await
            .map(|(result, _)| result);

        let success = matches!(&outcome, Ok(result) if !result.is_degraded());
        self.record(OperationKind::RelationshipValidation, start, success, count);
        outcome
    }

    /// Runs entity validation and, when pairs were supplied, relationship
    /// validation concurrently under one time budget.
    ///
    /// The batch limit applies to the combined item count, and both parts run
    /// with the strategy chosen for that combined count.
    #[instrument(skip_all, name = "validate_comprehensive")]
    pub async fn validate_comprehensive(
        &self,
        request: &ComprehensiveValidationRequest,
        cancel: &CancellationToken,
    ) -> ValidationResult<ComprehensiveValidationResult> {
        let entity_sets = request.entities.sanitize();
        let relationship_sets = request
            .relationships
            .as_ref()
            .filter(|relationships| !relationships.is_empty())
            .map(RelationshipValidationRequest::sanitize);

        let entity_total = entity_count(&entity_sets);
        let relationship_total = relationship_sets.as_ref().map_or(0, pair_count);
        let total = entity_total + relationship_total;
        self.check_batch_size(total)?;

        let start = Instant::now();
        let strategy = select_strategy(total, &self.options);
        let combined = async {
            let relationships = async {
                match &relationship_sets {
                    Some(sets) => self.resolve_relationships(sets, strategy).await.map(Some),
                    None => Ok(None),
                }
            };
            let (entities, relationships) =
                tokio::join!(self.resolve_entities(&entity_sets, strategy), relationships);
            Ok::<_, ValidationError>((entities?, relationships?))
        };
        let outcome = self.with_budget(cancel, combined).await;

        let outcome = outcome.map(|((entities, entities_cached), relationships)| {
            // An empty part issues no lookup and must not veto the flag.
            let entities_cached = entities_cached || entity_total == 0;
            let relationships_cached = relationships.as_ref().map_or(true, |(_, hit)| *hit);
            let relationships = relationships.map(|(result, _)| result);

            let all_valid = relationships
                .as_ref()
                .map_or(true, |result| result.all_valid());
            let degraded = entities.is_degraded()
                || relationships
                    .as_ref()
                    .is_some_and(|result| result.is_degraded());

            ComprehensiveValidationResult {
                valid: entities.all_exist() && all_valid,
                metadata: ValidationMetadata {
                    validated_at: Utc::now(),
                    duration: start.elapsed(),
                    strategy,
                    entity_count: entity_total,
                    relationship_count: relationship_total,
                    served_from_cache: total > 0 && entities_cached && relationships_cached,
                    degraded,
                },
                entities,
                relationships,
            }
        });

        let success = matches!(&outcome, Ok(result) if !result.metadata.degraded);
        self.record(OperationKind::ComprehensiveValidation, start, success, total);
        outcome
    }

    /// Checks proposed file names against live documents of their matters.
    ///
    /// File-name checks are not cached: uniqueness must reflect the store at
    /// the time of the call.
    #[instrument(skip_all, name = "validate_file_names", fields(count = requests.len()))]
    pub async fn validate_file_names(
        &self,
        requests: &[FileNameRequest],
        cancel: &CancellationToken,
    ) -> ValidationResult<FileNameValidationResult> {
        let count = requests.len();
        self.check_batch_size(count)?;

        let start = Instant::now();
        let strategy = select_strategy(count, &self.options);
        if count > 0 {
            self.tracker.record_strategy(strategy);
        }
        let outcome = self
            .with_budget(cancel, async {
                self.executor
                    .check_file_names(requests, strategy)
                    .await
                    .map_err(escalate)
            })
            .await;

        let success = matches!(&outcome, Ok(result) if !result.degraded);
        self.record(OperationKind::FileNameValidation, start, success, count);
        outcome
    }

    /// Current engine metrics.
    pub fn metrics(&self) -> ValidationMetricsReport {
        ValidationMetricsReport {
            summary: self.tracker.summary(),
            operations: self.tracker.all_stats(),
            cache: self.cache.stats(),
            in_flight_requests: self.entity_flights.in_flight()
                + self.relationship_flights.in_flight(),
        }
    }

    /// Scores engine health in `[0, 1]`.
    ///
    /// Penalties: failed store probe 0.4, success rate under 95% (after at
    /// least 10 operations) 0.2, average duration above the slow threshold
    /// 0.15, each configuration issue 0.1, cache malfunction 0.1. A failed
    /// store probe makes the engine unhealthy regardless of score.
    #[instrument(skip_all, name = "check_health")]
    pub async fn check_health(&self, cancel: &CancellationToken) -> HealthReport {
        let mut score = 1.0_f64;
        let mut issues = Vec::new();

        let store_latency = match self.probe_store(cancel).await {
            Ok(latency) => Some(latency),
            Err(reason) => {
                score -= STORE_PROBE_PENALTY;
                issues.push(format!("store connectivity: {reason}"));
                None
            }
        };
        let connectivity_issue = store_latency.is_none();

        let summary = self.tracker.summary();
        if summary.window_operations >= MIN_OPERATIONS_FOR_SUCCESS_RATE
            && summary.success_rate < MIN_SUCCESS_RATE
        {
            score -= LOW_SUCCESS_RATE_PENALTY;
            issues.push(format!(
                "success rate {:.1}% is below {:.0}%",
                summary.success_rate * 100.0,
                MIN_SUCCESS_RATE * 100.0
            ));
        }

        let slow_threshold_ms = self.options.slow_operation_threshold.as_secs_f64() * 1000.0;
        if summary.avg_duration_ms > slow_threshold_ms {
            score -= SLOW_OPERATIONS_PENALTY;
            issues.push(format!(
                "average duration {:.1}ms exceeds {:.0}ms",
                summary.avg_duration_ms, slow_threshold_ms
            ));
        }

        for issue in self.options.configuration_issues() {
            score -= CONFIGURATION_ISSUE_PENALTY;
            issues.push(format!("configuration: {issue}"));
        }

        if !self.cache.probe().await {
            score -= CACHE_MALFUNCTION_PENALTY;
            issues.push("cache probe failed".to_string());
        }

        let score = score.clamp(0.0, 1.0);
        let healthy = score >= HEALTHY_SCORE_THRESHOLD && !connectivity_issue;
        metrics::gauge!("lexval_health_score").set(score);

        if healthy {
            debug!(score, "health check passed");
        } else {
            warn!(score, issues = ?issues, "health check failed");
        }

        HealthReport {
            healthy,
            score,
            issues,
            store_latency,
            checked_at: Utc::now(),
        }
    }

    /// Drops every cached result.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("validation cache cleared");
    }

    pub fn configuration(&self) -> ConfigurationReport {
        ConfigurationReport {
            options: self.options.clone(),
            issues: self.options.configuration_issues(),
        }
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    fn check_batch_size(&self, count: usize) -> ValidationResult<()> {
        if count > self.options.max_batch_size {
            warn!(
                size = count,
                max = self.options.max_batch_size,
                "batch rejected"
            );
            return Err(ValidationError::BatchTooLarge {
                size: count,
                max: self.options.max_batch_size,
            });
        }
        Ok(())
    }

    fn record(&self, kind: OperationKind, start: Instant, success: bool, count: usize) {
        let elapsed = start.elapsed();
        self.tracker.record(kind, elapsed, success, count);
        if elapsed > self.options.slow_operation_threshold {
            warn!(
                operation = %kind.label(),
                duration_ms = elapsed.as_millis() as u64,
                count,
                "slow validation operation"
            );
        }
    }

    /// Runs `operation` until it finishes, the budget elapses or the caller
    /// cancels. Dropping the operation cancels every sub-query it spawned.
    async fn with_budget<T, F>(&self, cancel: &CancellationToken, operation: F) -> ValidationResult<T>
    where
        F: Future<Output = ValidationResult<T>>,
    {
        let budget = self.options.batch_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("validation cancelled by caller");
                Err(ValidationError::Cancelled)
            }
            outcome = tokio::time::timeout(budget, operation) => {
                outcome.unwrap_or_else(|_| {
                    warn!(budget_ms = budget.as_millis() as u64, "validation timed out");
                    Err(ValidationError::timeout(budget))
                })
            }
        }
    }

    async fn probe_store(&self, cancel: &CancellationToken) -> Result<Duration, String> {
        let budget = self.options.batch_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("probe cancelled".to_string()),
            probe = tokio::time::timeout(budget, self.executor.reader().probe()) => match probe {
                Ok(Ok(latency)) => Ok(latency),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err(format!("probe timed out after {}ms", budget.as_millis())),
            }
        }
    }

    /// Entity results plus whether they came from the cache.
    async fn resolve_entities(
        &self,
        sets: &EntityIdSets,
        strategy: ExecutionStrategy,
    ) -> ValidationResult<(Arc<EntityValidationResult>, bool)> {
        if entity_count(sets) == 0 {
            return Ok((Arc::new(EntityValidationResult::empty()), false));
        }

        let key = CacheKey::for_entities(sets);
        let (result, cached) = self
            .run_coalesced(&self.entity_flights, key, || {
                self.compute_entities(sets, strategy)
            })
            .await;
        result.map(|result| (result, cached))
    }

    async fn resolve_relationships(
        &self,
        sets: &RelationshipPairSets,
        strategy: ExecutionStrategy,
    ) -> ValidationResult<(Arc<RelationshipValidationResult>, bool)> {
        if pair_count(sets) == 0 {
            return Ok((Arc::new(RelationshipValidationResult::empty()), false));
        }

        let key = CacheKey::for_relationships(sets);
        let (result, cached) = self
            .run_coalesced(&self.relationship_flights, key, || {
                self.compute_relationships(sets, strategy)
            })
            .await;
        result.map(|result| (result, cached))
    }

    /// Serves `key` from the cache, from an identical in-flight request, or
    /// by running `compute` as the leader.
    ///
    /// The second element is true on a cache hit. A follower whose leader
    /// disappears (timed out or cancelled) retries from the top.
    async fn run_coalesced<T, F, Fut>(
        &self,
        flights: &Singleflight<CacheKey, Flight<T>>,
        key: CacheKey,
        compute: F,
    ) -> (Flight<T>, bool)
    where
        T: CachedResult,
        F: Fn() -> Fut,
        Fut: Future<Output = Flight<T>>,
    {
        loop {
            if let Some(hit) = self.cache.lookup(&key).await.and_then(T::from_cached) {
                debug!(key = %key, "served from cache");
                return (Ok(hit), true);
            }

            match flights.acquire(key.clone()) {
                SingleflightSlot::Follower(mut receiver) => match receiver.recv().await {
                    Ok(result) => {
                        self.tracker.record_coalesced();
                        debug!(key = %key, "joined in-flight request");
                        return (result, false);
                    }
                    Err(_) => continue,
                },
                SingleflightSlot::Leader(sender) => {
                    let guard = SingleflightGuard::new(flights, key.clone());

                    let result = compute().await;
                    if let Ok(value) = &result {
                        if !value.is_degraded() {
                            self.cache
                                .insert_with_ttl(
                                    key.clone(),
                                    T::into_cached(Arc::clone(value)),
                                    self.options.cache_expiration,
                                )
                                .await;
                        }
                    }

                    // No receivers is fine.
                    let _ = sender.send(result.clone());
                    guard.complete();
                    return (result, false);
                }
            }
        }
    }

    async fn compute_entities(
        &self,
        sets: &EntityIdSets,
        strategy: ExecutionStrategy,
    ) -> Flight<EntityValidationResult> {
        self.tracker.record_strategy(strategy);
        let ids_for = |kind: EntityKind| sets.get(&kind).unwrap_or(&EMPTY_IDS);

        let outcomes = match strategy {
            ExecutionStrategy::Parallel => {
                join_all(EntityKind::ALL.into_iter().map(|kind| async move {
                    (kind, self.executor.check_existing(kind, ids_for(kind)).await)
                }))
                .await
            }
            ExecutionStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(EntityKind::ALL.len());
                for kind in EntityKind::ALL {
                    outcomes.push((kind, self.executor.check_existing(kind, ids_for(kind)).await));
                }
                outcomes
            }
        };

        let mut merged = BTreeMap::<EntityKind, ExistenceOutcome>::new();
        let mut failure: Option<DomainError> = None;
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    merged.insert(kind, outcome);
                }
                Err(err @ (DomainError::Timeout { .. } | DomainError::InvalidInput { .. })) => {
                    return Err(escalate(err));
                }
                Err(err) => {
                    error!(kind = %kind, error = %err, "existence query failed");
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            warn!(error = %err, "returning degraded entity result");
            return Ok(Arc::new(EntityValidationResult::degraded(sets)));
        }
        Ok(Arc::new(EntityValidationResult::new(merged)))
    }

    async fn compute_relationships(
        &self,
        sets: &RelationshipPairSets,
        strategy: ExecutionStrategy,
    ) -> Flight<RelationshipValidationResult> {
        self.tracker.record_strategy(strategy);
        let pairs_for = |kind: RelationshipKind| sets.get(&kind).unwrap_or(&EMPTY_PAIRS);

        let outcomes = match strategy {
            ExecutionStrategy::Parallel => {
                join_all(RelationshipKind::ALL.into_iter().map(|kind| async move {
                    (
                        kind,
                        self.executor.check_relationships(kind, pairs_for(kind)).await,
                    )
                }))
                .await
            }
            ExecutionStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(RelationshipKind::ALL.len());
                for kind in RelationshipKind::ALL {
                    outcomes.push((
                        kind,
                        self.executor.check_relationships(kind, pairs_for(kind)).await,
                    ));
                }
                outcomes
            }
        };

        let mut merged = BTreeMap::<RelationshipKind, PairOutcome>::new();
        let mut failure: Option<DomainError> = None;
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    merged.insert(kind, outcome);
                }
                Err(err @ (DomainError::Timeout { .. } | DomainError::InvalidInput { .. })) => {
                    return Err(escalate(err));
                }
                Err(err) => {
                    error!(kind = %kind, error = %err, "relationship query failed");
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            warn!(error = %err, "returning degraded relationship result");
            return Ok(Arc::new(RelationshipValidationResult::degraded(sets)));
        }
        Ok(Arc::new(RelationshipValidationResult::new(merged)))
    }
}
