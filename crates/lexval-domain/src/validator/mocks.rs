//! Mock reader for executor tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{DomainError, DomainResult};
use crate::ids::{EntityKind, IdentifierSet, PairSet, RelationshipKind, RelationshipPair};
use crate::validator::EntityReader;

/// In-memory reader that counts every query it answers.
pub struct MockEntityReader {
    entities: RwLock<HashMap<EntityKind, HashSet<String>>>,
    links: RwLock<HashMap<RelationshipKind, HashSet<RelationshipPair>>>,
    file_names: RwLock<HashMap<String, Vec<String>>>,
    failure: RwLock<Option<DomainError>>,
    calls: AtomicUsize,
}

impl MockEntityReader {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            links: RwLock::new(HashMap::new()),
            file_names: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn add_entity(&self, kind: EntityKind, id: &str) {
        self.entities
            .write()
            .await
            .entry(kind)
            .or_default()
            .insert(id.to_string());
    }

    pub async fn add_link(&self, kind: RelationshipKind, parent_id: &str, child_id: &str) {
        self.links
            .write()
            .await
            .entry(kind)
            .or_default()
            .insert(RelationshipPair::new(parent_id, child_id));
    }

    pub async fn add_file_name(&self, matter_id: &str, file_name: &str) {
        self.file_names
            .write()
            .await
            .entry(matter_id.to_string())
            .or_default()
            .push(file_name.to_string());
    }

    /// Makes every subsequent query fail with `error`.
    pub async fn fail_with(&self, error: DomainError) {
        *self.failure.write().await = Some(error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.read().await.as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EntityReader for MockEntityReader {
    async fn existing_ids(
        &self,
        kind: EntityKind,
        ids: &IdentifierSet,
    ) -> DomainResult<HashSet<String>> {
        self.begin().await?;
        let entities = self.entities.read().await;
        Ok(entities
            .get(&kind)
            .map(|known| ids.iter().filter(|id| known.contains(*id)).cloned().collect())
            .unwrap_or_default())
    }

    async fn linked_pairs(
        &self,
        kind: RelationshipKind,
        pairs: &PairSet,
    ) -> DomainResult<HashSet<RelationshipPair>> {
        self.begin().await?;
        let links = self.links.read().await;
        Ok(links
            .get(&kind)
            .map(|known| pairs.iter().filter(|pair| known.contains(*pair)).cloned().collect())
            .unwrap_or_default())
    }

    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> DomainResult<Vec<String>> {
        self.begin().await?;
        let wanted: HashSet<String> = file_names.iter().map(|n| n.to_lowercase()).collect();
        let stored = self.file_names.read().await;
        Ok(stored
            .get(matter_id)
            .map(|names| {
                names
                    .iter()
                    .filter(|name| wanted.contains(&name.to_lowercase()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn probe(&self) -> DomainResult<Duration> {
        self.begin().await?;
        Ok(Duration::ZERO)
    }
}
