//! Existence queries: which identifiers of one kind are live in the store.

use std::time::Instant;

use tracing::{debug, instrument};

use super::{EntityReader, QueryExecutor};
use crate::error::DomainResult;
use crate::ids::{EntityKind, IdentifierSet};
use crate::metrics::OperationKind;
use crate::results::ExistenceOutcome;

impl<R: EntityReader> QueryExecutor<R> {
    /// Splits `ids` into existing and missing identifiers of `kind`.
    ///
    /// An empty set returns immediately without touching the store. Store
    /// failures are returned as errors; the caller decides how to degrade.
    #[instrument(skip_all, fields(kind = %kind, count = ids.len()))]
    pub async fn check_existing(
        &self,
        kind: EntityKind,
        ids: &IdentifierSet,
    ) -> DomainResult<ExistenceOutcome> {
        if ids.is_empty() {
            return Ok(ExistenceOutcome::default());
        }

        let start = Instant::now();
        let found = self.reader.existing_ids(kind, ids).await;
        self.tracker.record(
            OperationKind::ExistenceQuery(kind),
            start.elapsed(),
            found.is_ok(),
            ids.len(),
        );

        let (existing, missing) = ids.partition(&found?);
        debug!(
            existing = existing.len(),
            missing = missing.len(),
            "existence query completed"
        );
        Ok(ExistenceOutcome::new(existing, missing))
    }
}
