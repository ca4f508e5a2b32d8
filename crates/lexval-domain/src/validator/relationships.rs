//! Relationship queries: which claimed parent/child links hold in the store.

use std::time::Instant;

use tracing::{debug, instrument};

use super::{EntityReader, QueryExecutor};
use crate::error::DomainResult;
use crate::ids::{PairSet, RelationshipKind};
use crate::metrics::OperationKind;
use crate::results::PairOutcome;

impl<R: EntityReader> QueryExecutor<R> {
    /// Splits `pairs` into valid and invalid links of `kind`.
    ///
    /// A pair is invalid when the child does not exist, is soft-deleted, or
    /// belongs to a different parent. An empty set issues no query.
    #[instrument(skip_all, fields(kind = %kind, count = pairs.len()))]
    pub async fn check_relationships(
        &self,
        kind: RelationshipKind,
        pairs: &PairSet,
    ) -> DomainResult<PairOutcome> {
        if pairs.is_empty() {
            return Ok(PairOutcome::default());
        }

        let start = Instant::now();
        let linked = self.reader.linked_pairs(kind, pairs).await;
        self.tracker.record(
            OperationKind::RelationshipQuery(kind),
            start.elapsed(),
            linked.is_ok(),
            pairs.len(),
        );

        let (valid, invalid) = pairs.partition(&linked?);
        debug!(
            valid = valid.len(),
            invalid = invalid.len(),
            "relationship query completed"
        );
        Ok(PairOutcome::new(valid, invalid))
    }
}
