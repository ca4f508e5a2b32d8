//! Entity kinds, identifier sets and relationship pairs.
//!
//! Every identifier entering the engine passes through [`IdentifierSet::sanitize`]
//! or [`PairSet::sanitize`]. After sanitizing, a set never contains empty
//! values, the nil UUID, or duplicates, and its order is the order of first
//! appearance in the input.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sanitized identifier sets of one request, keyed by entity kind.
pub type EntityIdSets = BTreeMap<EntityKind, IdentifierSet>;

/// Sanitized pair sets of one request, keyed by relationship kind.
pub type RelationshipPairSets = BTreeMap<RelationshipKind, PairSet>;

/// The closed set of validated entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Matter,
    Document,
    Revision,
}

impl EntityKind {
    /// All kinds, in canonical order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Matter, EntityKind::Document, EntityKind::Revision];

    /// Short tag used in cache keys.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Matter => "M",
            EntityKind::Document => "D",
            EntityKind::Revision => "R",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Matter => "matter",
            EntityKind::Document => "document",
            EntityKind::Revision => "revision",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of parent/child containment relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// A document claimed to belong to a matter.
    DocumentMatter,
    /// A revision claimed to belong to a document.
    RevisionDocument,
}

impl RelationshipKind {
    /// All kinds, in canonical order.
    pub const ALL: [RelationshipKind; 2] = [
        RelationshipKind::DocumentMatter,
        RelationshipKind::RevisionDocument,
    ];

    pub fn parent_kind(self) -> EntityKind {
        match self {
            RelationshipKind::DocumentMatter => EntityKind::Matter,
            RelationshipKind::RevisionDocument => EntityKind::Document,
        }
    }

    pub fn child_kind(self) -> EntityKind {
        match self {
            RelationshipKind::DocumentMatter => EntityKind::Document,
            RelationshipKind::RevisionDocument => EntityKind::Revision,
        }
    }

    /// Short tag used in cache keys.
    pub fn tag(self) -> &'static str {
        match self {
            RelationshipKind::DocumentMatter => "DM",
            RelationshipKind::RevisionDocument => "RD",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::DocumentMatter => "document_matter",
            RelationshipKind::RevisionDocument => "revision_document",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a single raw identifier.
///
/// Returns `None` for blank values and the nil UUID. Values that parse as a
/// UUID are rewritten to lowercase hyphenated form so that differently
/// formatted spellings of one id collapse together; anything else is kept
/// verbatim after trimming.
pub fn canonicalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Uuid::parse_str(trimmed) {
        Ok(uuid) if uuid.is_nil() => None,
        Ok(uuid) => Some(uuid.hyphenated().to_string()),
        Err(_) => Some(trimmed.to_string()),
    }
}

/// An ordered set of unique, non-empty identifiers for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdentifierSet {
    ids: Vec<String>,
}

impl IdentifierSet {
    /// Creates an empty set.
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Builds a set from arbitrary input, dropping blank/nil values and
    /// duplicates while keeping first-appearance order.
    pub fn sanitize<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let ids = raw
            .into_iter()
            .filter_map(|id| canonicalize_identifier(id.as_ref()))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|candidate| candidate == id)
    }

    /// Identifiers in lexicographic order (used for key derivation).
    pub fn sorted(&self) -> Vec<&str> {
        let mut sorted: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted
    }

    /// Splits the set into `(present, absent)` according to `found`.
    ///
    /// Ids in `found` that were never requested are ignored, so the two
    /// halves always partition `self` exactly.
    pub fn partition(&self, found: &HashSet<String>) -> (IdentifierSet, IdentifierSet) {
        let (present, absent): (Vec<String>, Vec<String>) =
            self.ids.iter().cloned().partition(|id| found.contains(id));
        (Self { ids: present }, Self { ids: absent })
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

impl<'a> IntoIterator for &'a IdentifierSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// A claimed `(parent, child)` containment link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipPair {
    pub parent_id: String,
    pub child_id: String,
}

impl RelationshipPair {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }

    /// Canonicalizes both halves; `None` if either is blank or nil.
    fn canonical(&self) -> Option<Self> {
        Some(Self {
            parent_id: canonicalize_identifier(&self.parent_id)?,
            child_id: canonicalize_identifier(&self.child_id)?,
        })
    }
}

/// An ordered set of unique, fully-populated relationship pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PairSet {
    pairs: Vec<RelationshipPair>,
}

impl PairSet {
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Builds a set from arbitrary pairs, dropping pairs with a blank/nil
    /// side and duplicates while keeping first-appearance order.
    pub fn sanitize<I>(raw: I) -> Self
    where
        I: IntoIterator<Item = RelationshipPair>,
    {
        let mut seen = HashSet::new();
        let pairs = raw
            .into_iter()
            .filter_map(|pair| pair.canonical())
            .filter(|pair| seen.insert(pair.clone()))
            .collect();
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RelationshipPair> {
        self.pairs.iter()
    }

    pub fn as_slice(&self) -> &[RelationshipPair] {
        &self.pairs
    }

    /// Pairs in sorted order (used for key derivation).
    pub fn sorted(&self) -> Vec<&RelationshipPair> {
        let mut sorted: Vec<&RelationshipPair> = self.pairs.iter().collect();
        sorted.sort_unstable();
        sorted
    }

    /// Splits the set into `(linked, unlinked)` according to `found`.
    pub fn partition(&self, found: &HashSet<RelationshipPair>) -> (PairSet, PairSet) {
        let (linked, unlinked): (Vec<RelationshipPair>, Vec<RelationshipPair>) =
            self.pairs.iter().cloned().partition(|pair| found.contains(pair));
        (Self { pairs: linked }, Self { pairs: unlinked })
    }
}

impl<'a> IntoIterator for &'a PairSet {
    type Item = &'a RelationshipPair;
    type IntoIter = std::slice::Iter<'a, RelationshipPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}
