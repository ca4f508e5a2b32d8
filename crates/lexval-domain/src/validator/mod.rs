//! Store query executors.
//!
//! [`QueryExecutor`] issues the per-kind queries that make up a validation
//! request: one set-membership query per entity kind, one link query per
//! relationship kind, and one file-name query per matter. It knows nothing
//! about caching, strategy selection or time budgets; the orchestrator in
//! the server crate layers those on top.
//!
//! Every sub-query is recorded in the shared [`PerformanceTracker`] under
//! its own [`OperationKind`](crate::metrics::OperationKind), which gives the
//! metrics report its per-kind breakdown.

mod existence;
mod file_names;
mod relationships;
mod traits;

use std::sync::Arc;

use crate::metrics::PerformanceTracker;

pub use file_names::{
    validate_file_name, ConflictType, FileNameConflict, FileNameRequest, FileNameValidationResult,
    INVALID_FILE_NAME_CHARS, MAX_FILE_NAME_CHARS,
};
pub use traits::EntityReader;

/// Issues validation queries through an [`EntityReader`].
pub struct QueryExecutor<R: EntityReader> {
    reader: Arc<R>,
    tracker: Arc<PerformanceTracker>,
}

impl<R: EntityReader> QueryExecutor<R> {
    pub fn new(reader: Arc<R>, tracker: Arc<PerformanceTracker>) -> Self {
        Self { reader, tracker }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }
}

impl<R: EntityReader> Clone for QueryExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            tracker: Arc::clone(&self.tracker),
        }
    }
}

#[cfg(test)]
pub(crate) mod mocks;
