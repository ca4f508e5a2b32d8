//! Rolling operation metrics.
//!
//! [`PerformanceTracker`] keeps a bounded window of
//! [`OperationMetricSample`]s per [`OperationKind`]. Each kind has its own
//! window behind its own `DashMap` shard entry, so recording one kind never
//! contends with another. Lifetime totals and strategy counters are plain
//! atomics.
//!
//! Top-level operations are also exported through the `metrics` crate:
//!
//! - `lexval_validation_operations_total{operation,status}`
//! - `lexval_validation_duration_seconds{operation}`
//! - `lexval_coalesced_requests_total`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::ids::{EntityKind, RelationshipKind};

/// Default number of samples retained per operation kind.
pub const DEFAULT_METRICS_WINDOW: usize = 1000;

/// What was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    EntityValidation,
    RelationshipValidation,
    ComprehensiveValidation,
    FileNameValidation,
    /// One existence query against a single entity collection.
    ExistenceQuery(EntityKind),
    /// One link query for a single relationship kind.
    RelationshipQuery(RelationshipKind),
}

impl OperationKind {
    /// Operations callers invoke directly, as opposed to the sub-queries
    /// they fan out into.
    pub fn is_top_level(self) -> bool {
        !matches!(
            self,
            OperationKind::ExistenceQuery(_) | OperationKind::RelationshipQuery(_)
        )
    }

    pub fn label(self) -> String {
        match self {
            OperationKind::EntityValidation => "entity_validation".to_string(),
            OperationKind::RelationshipValidation => "relationship_validation".to_string(),
            OperationKind::ComprehensiveValidation => "comprehensive_validation".to_string(),
            OperationKind::FileNameValidation => "file_name_validation".to_string(),
            OperationKind::ExistenceQuery(kind) => format!("existence_query:{kind}"),
            OperationKind::RelationshipQuery(kind) => format!("relationship_query:{kind}"),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Execution plan chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Parallel,
    Sequential,
}

impl ExecutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStrategy::Parallel => "parallel",
            ExecutionStrategy::Sequential => "sequential",
        }
    }
}

/// One completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMetricSample {
    pub duration: Duration,
    pub success: bool,
    pub item_count: usize,
}

#[derive(Debug)]
struct RollingWindow {
    samples: VecDeque<OperationMetricSample>,
    capacity: usize,
    lifetime_count: u64,
    lifetime_failures: u64,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            lifetime_count: 0,
            lifetime_failures: 0,
        }
    }

    fn push(&mut self, sample: OperationMetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.lifetime_count += 1;
        if !sample.success {
            self.lifetime_failures += 1;
        }
    }
}

/// Sums over a set of samples, used to derive averages.
#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    count: u64,
    successes: u64,
    items: u64,
    duration: Duration,
}

impl Totals {
    fn add_window(&mut self, window: &RollingWindow) {
        for sample in &window.samples {
            self.count += 1;
            self.items += sample.item_count as u64;
            self.duration += sample.duration;
            if sample.success {
                self.successes += 1;
            }
        }
    }

    fn avg_batch_size(&self) -> f64 {
        ratio(self.items as f64, self.count as f64)
    }

    fn avg_duration_ms(&self) -> f64 {
        ratio(self.duration.as_secs_f64() * 1000.0, self.count as f64)
    }

    /// Success rate in [0, 1]; 1.0 when nothing was recorded.
    fn success_rate(&self) -> f64 {
        if self.count == 0 {
            1.0
        } else {
            self.successes as f64 / self.count as f64
        }
    }

    /// Items processed per second of processing time.
    fn throughput(&self) -> f64 {
        ratio(self.items as f64, self.duration.as_secs_f64())
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Aggregates for one operation kind over its rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub operation: String,
    /// Samples currently in the window.
    pub window_count: u64,
    /// Operations recorded since startup.
    pub total_count: u64,
    pub total_failures: u64,
    pub avg_batch_size: f64,
    pub avg_duration_ms: f64,
    pub success_rate: f64,
    pub throughput_per_sec: f64,
}

/// Aggregates over all top-level operation kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSummary {
    pub total_operations: u64,
    /// Top-level samples currently held across windows.
    pub window_operations: u64,
    pub avg_batch_size: f64,
    pub avg_duration_ms: f64,
    pub success_rate: f64,
    pub throughput_per_sec: f64,
    pub parallel_runs: u64,
    pub sequential_runs: u64,
    pub coalesced_requests: u64,
}

/// Concurrent per-operation metrics.
#[derive(Debug)]
pub struct PerformanceTracker {
    windows: DashMap<OperationKind, RollingWindow>,
    window_size: usize,
    parallel_runs: AtomicU64,
    sequential_runs: AtomicU64,
    coalesced_requests: AtomicU64,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_METRICS_WINDOW)
    }
}

impl PerformanceTracker {
    /// Creates a tracker keeping at most `window_size` samples per kind.
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window_size: window_size.max(1),
            parallel_runs: AtomicU64::new(0),
            sequential_runs: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Records one completed operation.
    pub fn record(&self, kind: OperationKind, duration: Duration, success: bool, item_count: usize) {
        let sample = OperationMetricSample {
            duration,
            success,
            item_count,
        };
        self.windows
            .entry(kind)
            .or_insert_with(|| RollingWindow::new(self.window_size))
            .push(sample);

        if kind.is_top_level() {
            let operation = kind.label();
            let status = if success { "success" } else { "failure" };
            metrics::counter!(
                "lexval_validation_operations_total",
                "operation" => operation.clone(),
                "status" => status
            )
            .increment(1);
            metrics::histogram!(
                "lexval_validation_duration_seconds",
                "operation" => operation
            )
            .record(duration.as_secs_f64());
        }
    }

    pub fn record_strategy(&self, strategy: ExecutionStrategy) {
        let counter = match strategy {
            ExecutionStrategy::Parallel => &self.parallel_runs,
            ExecutionStrategy::Sequential => &self.sequential_runs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request that reused another in-flight request's result.
    pub fn record_coalesced(&self) {
        self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("lexval_coalesced_requests_total").increment(1);
    }

    pub fn strategy_count(&self, strategy: ExecutionStrategy) -> u64 {
        match strategy {
            ExecutionStrategy::Parallel => self.parallel_runs.load(Ordering::Relaxed),
            ExecutionStrategy::Sequential => self.sequential_runs.load(Ordering::Relaxed),
        }
    }

    pub fn coalesced_count(&self) -> u64 {
        self.coalesced_requests.load(Ordering::Relaxed)
    }

    /// Stats for a single kind, `None` if it was never recorded.
    pub fn operation_stats(&self, kind: OperationKind) -> Option<OperationStats> {
        self.windows.get(&kind).map(|window| stats_for(kind, &window))
    }

    /// Stats for every recorded kind, ordered by kind.
    pub fn all_stats(&self) -> Vec<OperationStats> {
        let mut stats: Vec<(OperationKind, OperationStats)> = self
            .windows
            .iter()
            .map(|entry| (*entry.key(), stats_for(*entry.key(), entry.value())))
            .collect();
        stats.sort_by_key(|(kind, _)| *kind);
        stats.into_iter().map(|(_, stats)| stats).collect()
    }

    /// Aggregates over top-level operations only.
    pub fn summary(&self) -> TrackerSummary {
        let mut totals = Totals::default();
        let mut total_operations = 0;
        for entry in self.windows.iter().filter(|entry| entry.key().is_top_level()) {
            totals.add_window(entry.value());
            total_operations += entry.value().lifetime_count;
        }

        TrackerSummary {
            total_operations,
            window_operations: totals.count,
            avg_batch_size: totals.avg_batch_size(),
            avg_duration_ms: totals.avg_duration_ms(),
            success_rate: totals.success_rate(),
            throughput_per_sec: totals.throughput(),
            parallel_runs: self.strategy_count(ExecutionStrategy::Parallel),
            sequential_runs: self.strategy_count(ExecutionStrategy::Sequential),
            coalesced_requests: self.coalesced_count(),
        }
    }
}

fn stats_for(kind: OperationKind, window: &RollingWindow) -> OperationStats {
    let mut totals = Totals::default();
    totals.add_window(window);
    OperationStats {
        operation: kind.label(),
        window_count: totals.count,
        total_count: window.lifetime_count,
        total_failures: window.lifetime_failures,
        avg_batch_size: totals.avg_batch_size(),
        avg_duration_ms: totals.avg_duration_ms(),
        success_rate: totals.success_rate(),
        throughput_per_sec: totals.throughput(),
    }
}

/// Registers validation metric descriptions with the installed recorder.
pub fn register_validation_metrics() {
    metrics::describe_counter!(
        "lexval_validation_operations_total",
        "Total number of top-level validation operations by outcome"
    );
    metrics::describe_histogram!(
        "lexval_validation_duration_seconds",
        "Duration of top-level validation operations in seconds"
    );
    metrics::describe_counter!(
        "lexval_coalesced_requests_total",
        "Requests served by joining an identical in-flight request"
    );
}
