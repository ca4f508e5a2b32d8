//! Property-based tests for identifier sets, results and cache keys.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use proptest::prelude::*;

    use crate::cache::CacheKey;
    use crate::ids::{EntityKind, IdentifierSet};
    use crate::results::{EntityValidationResult, ExistenceOutcome};

    /// Raw ids drawn from a small alphabet so duplicates and blanks are common.
    fn raw_ids_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                "[a-d][0-9]".prop_map(String::from),
                Just(String::new()),
                Just("  ".to_string()),
                Just("00000000-0000-0000-0000-000000000000".to_string()),
            ],
            0..30,
        )
    }

    /// Requested ids plus a subset the store "has".
    fn request_with_store() -> impl Strategy<Value = (Vec<String>, HashSet<String>)> {
        raw_ids_strategy().prop_flat_map(|raw| {
            let len = raw.len();
            (Just(raw), prop::collection::vec(any::<bool>(), len)).prop_map(|(raw, mask)| {
                let found = raw
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| *keep)
                    .map(|(id, _)| id.trim().to_string())
                    .collect();
                (raw, found)
            })
        })
    }

    proptest! {
        #[test]
        fn test_sanitized_set_has_no_blanks_or_duplicates(raw in raw_ids_strategy()) {
            let set = IdentifierSet::sanitize(&raw);

            let unique: HashSet<&String> = set.iter().collect();
            prop_assert_eq!(unique.len(), set.len());
            prop_assert!(set.iter().all(|id| !id.trim().is_empty()));
            prop_assert!(!set.contains("00000000-0000-0000-0000-000000000000"));
        }

        #[test]
        fn test_partition_covers_request_exactly((raw, found) in request_with_store()) {
            let requested = IdentifierSet::sanitize(&raw);

            let (existing, missing) = requested.partition(&found);

            let existing_ids: HashSet<&String> = existing.iter().collect();
            let missing_ids: HashSet<&String> = missing.iter().collect();
            let requested_ids: HashSet<&String> = requested.iter().collect();
            prop_assert!(existing_ids.is_disjoint(&missing_ids));
            let union: HashSet<&String> = existing_ids.union(&missing_ids).copied().collect();
            prop_assert_eq!(union, requested_ids);
        }

        #[test]
        fn test_all_exist_iff_nothing_missing(
            (matters, found_matters) in request_with_store(),
            (documents, found_documents) in request_with_store(),
        ) {
            let mut outcomes = BTreeMap::new();
            let (existing, missing) = IdentifierSet::sanitize(&matters).partition(&found_matters);
            outcomes.insert(EntityKind::Matter, ExistenceOutcome::new(existing, missing));
            let (existing, missing) =
                IdentifierSet::sanitize(&documents).partition(&found_documents);
            outcomes.insert(EntityKind::Document, ExistenceOutcome::new(existing, missing));

            let result = EntityValidationResult::new(outcomes);

            let nothing_missing = EntityKind::ALL
                .iter()
                .all(|kind| result.missing(*kind).is_empty());
            prop_assert_eq!(result.all_exist(), nothing_missing);
        }

        #[test]
        fn test_cache_key_stable_under_permutation(
            raw in raw_ids_strategy(),
            seed in any::<u64>(),
        ) {
            let mut shuffled = raw.clone();
            // Deterministic rotation plus reversal stands in for a shuffle
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left((seed as usize) % len);
            }
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            let key_for = |ids: &[String]| {
                let mut sets = BTreeMap::new();
                sets.insert(EntityKind::Revision, IdentifierSet::sanitize(ids));
                CacheKey::for_entities(&sets)
            };

            prop_assert_eq!(key_for(&raw), key_for(&shuffled));
        }
    }
}
