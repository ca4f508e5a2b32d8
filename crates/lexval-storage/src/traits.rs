//! RecordStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HealthStatus, StorageError, StorageResult};

/// Maximum length of a record identifier.
pub const MAX_RECORD_ID_LENGTH: usize = 128;

/// Maximum length of a stored document file name.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// The three entity collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Matters,
    Documents,
    Revisions,
}

impl Collection {
    /// Table name used by SQL backends.
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Matters => "matters",
            Collection::Documents => "documents",
            Collection::Revisions => "revisions",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Foreign-key links between collections.
///
/// Each link is resolved against the child collection: a `(parent, child)`
/// pair is linked when the live child row's foreign key equals the parent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    /// documents.matter_id -> matters.id
    DocumentMatter,
    /// revisions.document_id -> documents.id
    RevisionDocument,
}

impl Link {
    /// Collection holding the foreign key.
    pub fn child(&self) -> Collection {
        match self {
            Link::DocumentMatter => Collection::Documents,
            Link::RevisionDocument => Collection::Revisions,
        }
    }

    /// Collection referenced by the foreign key.
    pub fn parent(&self) -> Collection {
        match self {
            Link::DocumentMatter => Collection::Matters,
            Link::RevisionDocument => Collection::Documents,
        }
    }

    /// Name of the foreign key column on the child table.
    pub fn foreign_key(&self) -> &'static str {
        match self {
            Link::DocumentMatter => "matter_id",
            Link::RevisionDocument => "document_id",
        }
    }
}

/// A matter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatterRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MatterRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

/// A document row, owned by a matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: String,
    pub matter_id: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        matter_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            matter_id: matter_id.into(),
            file_name: file_name.into(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

/// A revision row, owned by a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub id: String,
    pub document_id: String,
    pub revision_number: i32,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RevisionRecord {
    pub fn new(id: impl Into<String>, document_id: impl Into<String>, revision_number: i32) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            revision_number,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

/// Validates a record identifier and returns the form it is stored under.
///
/// UUIDs are stored lowercase and hyphenated, which is the form the
/// validation engine queries with; any other id is stored trimmed but
/// otherwise verbatim. Foreign keys go through the same normalization so
/// parent lookups agree with the stored ids.
pub fn canonical_record_id(id: &str) -> StorageResult<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "record id cannot be empty".to_string(),
        });
    }
    if trimmed.len() > MAX_RECORD_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "record id exceeds maximum length of {MAX_RECORD_ID_LENGTH} characters"
            ),
        });
    }
    match Uuid::parse_str(trimmed) {
        Ok(uuid) if uuid.is_nil() => Err(StorageError::InvalidInput {
            message: "record id cannot be the nil UUID".to_string(),
        }),
        Ok(uuid) => Ok(uuid.hyphenated().to_string()),
        Err(_) => Ok(trimmed.to_string()),
    }
}

/// Validates a document file name before it is written.
pub fn validate_file_name(file_name: &str) -> StorageResult<()> {
    if file_name.trim().is_empty() {
        return Err(StorageError::InvalidInput {
            message: "file name cannot be empty".to_string(),
        });
    }
    if file_name.chars().count() > MAX_FILE_NAME_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "file name exceeds maximum length of {MAX_FILE_NAME_LENGTH} characters"
            ),
        });
    }
    Ok(())
}

/// Abstract storage interface for matters, documents and revisions.
///
/// Every query method only considers live rows: rows whose `deleted_at`
/// is set are treated as absent. Implementations must be thread-safe
/// (Send + Sync) and support async operations.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    // Validation queries

    /// Returns the subset of `ids` that exist as live rows in `collection`.
    ///
    /// Order of the returned ids is unspecified.
    async fn existing_ids(&self, collection: Collection, ids: &[String])
        -> StorageResult<Vec<String>>;

    /// Returns the subset of `(parent_id, child_id)` pairs for which a live
    /// child row references the given parent through `link`.
    async fn linked_pairs(
        &self,
        link: Link,
        pairs: &[(String, String)],
    ) -> StorageResult<Vec<(String, String)>>;

    /// Returns the file names of live documents in `matter_id` that match any
    /// of `file_names` case-insensitively. Names are returned as stored.
    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> StorageResult<Vec<String>>;

    /// Lightweight connectivity probe.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    // Write operations

    /// Creates a matter.
    async fn create_matter(&self, matter: MatterRecord) -> StorageResult<()>;

    /// Creates a document. The owning matter must be live.
    async fn create_document(&self, document: DocumentRecord) -> StorageResult<()>;

    /// Creates a revision. The owning document must be live.
    async fn create_revision(&self, revision: RevisionRecord) -> StorageResult<()>;

    /// Marks a row as deleted without removing it.
    ///
    /// Returns `RecordNotFound` if the row does not exist or is already deleted.
    async fn soft_delete(&self, collection: Collection, id: &str) -> StorageResult<()>;
}
