//! lexval-storage: Persistent record store abstraction
//!
//! This crate provides the storage layer queried by the validation engine:
//! - `RecordStore` trait for set-membership and relationship queries
//! - In-memory implementation for testing and local runs
//! - PostgreSQL implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               lexval-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - RecordStore trait definition │
//! │  memory.rs   - In-memory implementation     │
//! │  postgres.rs - PostgreSQL implementation    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! All three collections (matters, documents, revisions) support soft
//! deletion. Soft-deleted rows stay physically present but never appear in
//! query results.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

// Re-export commonly used types
pub use error::{HealthStatus, PoolStats, StorageError, StorageResult};
pub use memory::MemoryRecordStore;
pub use postgres::{PostgresConfig, PostgresRecordStore};
pub use traits::{
    canonical_record_id, Collection, DocumentRecord, Link, MatterRecord, RecordStore, RevisionRecord,
    MAX_FILE_NAME_LENGTH, MAX_RECORD_ID_LENGTH,
};
