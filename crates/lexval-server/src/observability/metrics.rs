//! Prometheus metrics recorder.
//!
//! # Metrics Exposed
//!
//! - `lexval_validation_operations_total` - Top-level operations by operation, status
//! - `lexval_validation_duration_seconds` - Top-level operation duration histogram
//! - `lexval_cache_hits_total` / `lexval_cache_misses_total` - Cache lookups
//! - `lexval_coalesced_requests_total` - Requests that joined an in-flight twin
//! - `lexval_storage_query_duration_seconds` - Store query duration histogram
//! - `lexval_storage_query_timeout_total` - Store query timeouts

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Holds the Prometheus handle used to render the text exposition format.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder and describes every metric.
///
/// Call once at startup, before any metric is recorded.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    lexval_domain::metrics::register_validation_metrics();
    lexval_domain::cache::register_cache_metrics();

    metrics::describe_gauge!(
        "lexval_health_score",
        "Health score from the most recent health check, between 0 and 1"
    );

    metrics::describe_histogram!(
        "lexval_storage_query_duration_seconds",
        "Storage query duration in seconds by operation, backend, and status"
    );
    metrics::describe_counter!(
        "lexval_storage_query_timeout_total",
        "Total number of storage query timeouts by operation and backend"
    );
    metrics::describe_histogram!(
        "lexval_storage_health_check_duration_seconds",
        "Storage health check duration in seconds by backend and status"
    );
    metrics::describe_gauge!(
        "lexval_storage_pool_connections",
        "Number of database pool connections by backend and state (active, idle, max)"
    );
}
