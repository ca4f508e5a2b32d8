//! Strategy selection: parallel fan-out or sequential execution.

use lexval_domain::metrics::ExecutionStrategy;

use crate::config::ValidationOptions;

/// Picks the execution plan for a request of `candidate_count` items.
///
/// Parallel when parallel processing is enabled and the count reaches the
/// threshold; sequential otherwise.
pub fn select_strategy(candidate_count: usize, options: &ValidationOptions) -> ExecutionStrategy {
    if options.enable_parallel_processing && candidate_count >= options.parallel_threshold {
        ExecutionStrategy::Parallel
    } else {
        ExecutionStrategy::Sequential
    }
}
