//! lexval-server: Validation engine orchestration
//!
//! This crate wires the domain executors to a record store and exposes the
//! batch validation operations:
//! - Entity existence and relationship validation with caching and request
//!   coalescing
//! - Comprehensive and file-name validation
//! - Metrics, health scoring and configuration reporting
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               lexval-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  adapters.rs    - RecordStore → EntityReader│
//! │  handlers/      - Validation handler        │
//! │  observability/ - Logging and metrics       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod observability;

// Re-exports for convenience
pub use adapters::StoreEntityReader;
pub use config::{ConfigLoadError, ServerConfig, ValidationOptions};
pub use handlers::validation::{ValidationError, ValidationHandler};
