//! Immutable validation result types.
//!
//! Results are assembled once by the orchestrator and never mutated
//! afterwards; the cache shares them behind an `Arc`. Every entity kind
//! (and every relationship kind) is always present in a result, so callers
//! can index by kind without handling absence.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ids::{EntityKind, IdentifierSet, PairSet, RelationshipKind};

static EMPTY_EXISTENCE: ExistenceOutcome = ExistenceOutcome {
    existing: IdentifierSet::new(),
    missing: IdentifierSet::new(),
};

static EMPTY_PAIRS: PairOutcome = PairOutcome {
    valid: PairSet::new(),
    invalid: PairSet::new(),
};

/// Existing/missing split for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExistenceOutcome {
    pub existing: IdentifierSet,
    pub missing: IdentifierSet,
}

impl ExistenceOutcome {
    pub fn new(existing: IdentifierSet, missing: IdentifierSet) -> Self {
        Self { existing, missing }
    }

    /// Every requested id reported missing.
    pub fn all_missing(requested: &IdentifierSet) -> Self {
        Self {
            existing: IdentifierSet::new(),
            missing: requested.clone(),
        }
    }
}

/// Result of checking which identifiers exist, per entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityValidationResult {
    outcomes: BTreeMap<EntityKind, ExistenceOutcome>,
    all_exist: bool,
    degraded: bool,
}

impl EntityValidationResult {
    /// Assembles a result from per-kind outcomes. Kinds absent from
    /// `outcomes` are filled in as empty.
    pub fn new(outcomes: BTreeMap<EntityKind, ExistenceOutcome>) -> Self {
        Self::assemble(outcomes, false)
    }

    /// The result of an empty request.
    pub fn empty() -> Self {
        Self::assemble(BTreeMap::new(), false)
    }

    /// Fail-safe result used when the store could not answer: every
    /// requested identifier is reported missing and the result is flagged.
    pub fn degraded(requested: &BTreeMap<EntityKind, IdentifierSet>) -> Self {
        let outcomes = requested
            .iter()
            .map(|(kind, ids)| (*kind, ExistenceOutcome::all_missing(ids)))
            .collect();
        Self::assemble(outcomes, true)
    }

    fn assemble(mut outcomes: BTreeMap<EntityKind, ExistenceOutcome>, degraded: bool) -> Self {
        for kind in EntityKind::ALL {
            outcomes.entry(kind).or_default();
        }
        let all_exist = outcomes.values().all(|outcome| outcome.missing.is_empty());
        Self {
            outcomes,
            all_exist,
            degraded,
        }
    }

    pub fn outcome(&self, kind: EntityKind) -> &ExistenceOutcome {
        self.outcomes.get(&kind).unwrap_or(&EMPTY_EXISTENCE)
    }

    pub fn existing(&self, kind: EntityKind) -> &IdentifierSet {
        &self.outcome(kind).existing
    }

    pub fn missing(&self, kind: EntityKind) -> &IdentifierSet {
        &self.outcome(kind).missing
    }

    /// True iff every `missing` set is empty.
    pub fn all_exist(&self) -> bool {
        self.all_exist
    }

    /// True when the result was produced by the store-failure fallback
    /// rather than by an actual lookup.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of identifiers checked across all kinds.
    pub fn entity_count(&self) -> usize {
        self.outcomes
            .values()
            .map(|outcome| outcome.existing.len() + outcome.missing.len())
            .sum()
    }

    pub fn missing_count(&self) -> usize {
        self.outcomes.values().map(|outcome| outcome.missing.len()).sum()
    }
}

/// Valid/invalid split for one relationship kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairOutcome {
    pub valid: PairSet,
    pub invalid: PairSet,
}

impl PairOutcome {
    pub fn new(valid: PairSet, invalid: PairSet) -> Self {
        Self { valid, invalid }
    }

    pub fn all_invalid(requested: &PairSet) -> Self {
        Self {
            valid: PairSet::new(),
            invalid: requested.clone(),
        }
    }
}

/// Result of checking claimed containment links, per relationship kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipValidationResult {
    outcomes: BTreeMap<RelationshipKind, PairOutcome>,
    all_valid: bool,
    degraded: bool,
}

impl RelationshipValidationResult {
    pub fn new(outcomes: BTreeMap<RelationshipKind, PairOutcome>) -> Self {
        Self::assemble(outcomes, false)
    }

    pub fn empty() -> Self {
        Self::assemble(BTreeMap::new(), false)
    }

    /// Fail-safe result: every requested pair reported invalid.
    pub fn degraded(requested: &BTreeMap<RelationshipKind, PairSet>) -> Self {
        let outcomes = requested
            .iter()
            .map(|(kind, pairs)| (*kind, PairOutcome::all_invalid(pairs)))
            .collect();
        Self::assemble(outcomes, true)
    }

    fn assemble(mut outcomes: BTreeMap<RelationshipKind, PairOutcome>, degraded: bool) -> Self {
        for kind in RelationshipKind::ALL {
            outcomes.entry(kind).or_default();
        }
        let all_valid = outcomes.values().all(|outcome| outcome.invalid.is_empty());
        Self {
            outcomes,
            all_valid,
            degraded,
        }
    }

    pub fn outcome(&self, kind: RelationshipKind) -> &PairOutcome {
        self.outcomes.get(&kind).unwrap_or(&EMPTY_PAIRS)
    }

    pub fn valid(&self, kind: RelationshipKind) -> &PairSet {
        &self.outcome(kind).valid
    }

    pub fn invalid(&self, kind: RelationshipKind) -> &PairSet {
        &self.outcome(kind).invalid
    }

    /// True iff every `invalid` set is empty.
    pub fn all_valid(&self) -> bool {
        self.all_valid
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn pair_count(&self) -> usize {
        self.outcomes
            .values()
            .map(|outcome| outcome.valid.len() + outcome.invalid.len())
            .sum()
    }
}
