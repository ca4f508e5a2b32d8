//! Observability setup for the validation engine.
//!
//! - Structured logging (`tracing-subscriber`, text or JSON)
//! - Prometheus recorder for the `metrics` facade

mod logging;
mod metrics;

pub use logging::{create_json_layer, init_logging, LoggingConfig};
pub use metrics::{init_metrics, MetricsError, MetricsState};
