//! File-name uniqueness checks.
//!
//! Requests are screened locally first: a blank or nil matter id, or a file
//! name that could never be stored, is a conflict of type
//! [`ConflictType::InvalidRequest`] and never reaches the store. The rest are
//! grouped by matter, and each group costs exactly one case-insensitive
//! query against the matter's live documents.

use std::collections::{BTreeMap, HashSet};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{EntityReader, QueryExecutor};
use crate::error::{DomainError, DomainResult};
use crate::ids::canonicalize_identifier;
use crate::metrics::ExecutionStrategy;

/// Longest accepted file name, in characters.
pub const MAX_FILE_NAME_CHARS: usize = 255;

/// Characters no stored file name may contain.
pub const INVALID_FILE_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// A proposed file name for a document in a matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNameRequest {
    pub matter_id: String,
    pub file_name: String,
}

impl FileNameRequest {
    pub fn new(matter_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            matter_id: matter_id.into(),
            file_name: file_name.into(),
        }
    }
}

/// Why a proposed file name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// A live document already has exactly this name.
    ExactMatch,
    /// A live document has this name in a different letter case.
    CaseInsensitiveMatch,
    /// An earlier request in the same batch claims the same name.
    DuplicateInRequest,
    /// The request itself is malformed.
    InvalidRequest,
    /// The store could not be asked.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNameConflict {
    pub matter_id: String,
    pub file_name: String,
    pub conflict_type: ConflictType,
    /// The stored name that caused the conflict, for store matches.
    pub existing_file_name: Option<String>,
    pub message: String,
}

/// Outcome of a file-name batch. Conflicts and valid names keep the order
/// of the requests they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileNameValidationResult {
    pub has_conflicts: bool,
    pub conflicts: Vec<FileNameConflict>,
    pub valid_names: Vec<FileNameRequest>,
    /// Set when at least one matter group could not be checked.
    pub degraded: bool,
}

/// Checks that `file_name` could be stored at all.
pub fn validate_file_name(file_name: &str) -> DomainResult<()> {
    let invalid = |message: &str| {
        Err(DomainError::InvalidInput {
            message: message.to_string(),
        })
    };

    if file_name.trim().is_empty() {
        return invalid("file name cannot be empty");
    }
    if file_name.chars().count() > MAX_FILE_NAME_CHARS {
        return invalid("file name exceeds 255 characters");
    }
    if file_name
        .chars()
        .any(|c| c.is_control() || INVALID_FILE_NAME_CHARS.contains(&c))
    {
        return invalid("file name contains invalid characters");
    }
    if file_name.ends_with('.') || file_name.ends_with(' ') {
        return invalid("file name cannot end with a dot or space");
    }
    Ok(())
}

enum Verdict {
    Available(FileNameRequest),
    Conflict(FileNameConflict),
}

fn conflict(
    matter_id: &str,
    file_name: &str,
    conflict_type: ConflictType,
    existing_file_name: Option<String>,
    message: impl Into<String>,
) -> Verdict {
    Verdict::Conflict(FileNameConflict {
        matter_id: matter_id.to_string(),
        file_name: file_name.to_string(),
        conflict_type,
        existing_file_name,
        message: message.into(),
    })
}

/// Names awaiting a store check, by request position.
type Pending = Vec<(usize, String)>;

impl<R: EntityReader> QueryExecutor<R> {
    /// Classifies each requested name as available or conflicting.
    ///
    /// A store timeout for any group fails the whole batch. Other store
    /// failures mark that group's names [`ConflictType::Unverified`] and the
    /// result degraded.
    #[instrument(skip_all, fields(count = requests.len(), strategy = strategy.as_str()))]
    pub async fn check_file_names(
        &self,
        requests: &[FileNameRequest],
        strategy: ExecutionStrategy,
    ) -> DomainResult<FileNameValidationResult> {
        let mut verdicts: Vec<Option<Verdict>> = Vec::with_capacity(requests.len());
        let mut groups: BTreeMap<String, Pending> = BTreeMap::new();
        let mut claimed: HashSet<(String, String)> = HashSet::new();

        for (index, request) in requests.iter().enumerate() {
            let Some(matter_id) = canonicalize_identifier(&request.matter_id) else {
                verdicts.push(Some(conflict(
                    &request.matter_id,
                    &request.file_name,
                    ConflictType::InvalidRequest,
                    None,
                    "matter id is missing or nil",
                )));
                continue;
            };
            if let Err(err) = validate_file_name(&request.file_name) {
                verdicts.push(Some(conflict(
                    &matter_id,
                    &request.file_name,
                    ConflictType::InvalidRequest,
                    None,
                    err.to_string(),
                )));
                continue;
            }
            if !claimed.insert((matter_id.clone(), request.file_name.to_lowercase())) {
                verdicts.push(Some(conflict(
                    &matter_id,
                    &request.file_name,
                    ConflictType::DuplicateInRequest,
                    None,
                    "file name appears more than once for this matter in the request",
                )));
                continue;
            }
            groups
                .entry(matter_id)
                .or_default()
                .push((index, request.file_name.clone()));
            verdicts.push(None);
        }

        let lookups = match strategy {
            ExecutionStrategy::Parallel => {
                join_all(groups.iter().map(|(matter_id, pending)| {
                    self.lookup_group(matter_id, pending)
                }))
                .await
            }
            ExecutionStrategy::Sequential => {
                let mut lookups = Vec::with_capacity(groups.len());
                for (matter_id, pending) in &groups {
                    lookups.push(self.lookup_group(matter_id, pending).await);
                }
                lookups
            }
        };

        let mut degraded = false;
        for ((matter_id, pending), lookup) in groups.iter().zip(lookups) {
            match lookup {
                Ok(stored) => {
                    for (index, file_name) in pending {
                        verdicts[*index] = Some(classify(matter_id, file_name, &stored));
                    }
                }
                Err(err) if err.is_timeout() => return Err(err),
                Err(err) => {
                    warn!(matter_id = %matter_id, error = %err, "file name lookup failed, names unverified");
                    degraded = true;
                    for (index, file_name) in pending {
                        verdicts[*index] = Some(conflict(
                            matter_id,
                            file_name,
                            ConflictType::Unverified,
                            None,
                            "existing file names could not be checked",
                        ));
                    }
                }
            }
        }

        let mut result = FileNameValidationResult {
            degraded,
            ..FileNameValidationResult::default()
        };
        for verdict in verdicts.into_iter().flatten() {
            match verdict {
                Verdict::Available(request) => result.valid_names.push(request),
                Verdict::Conflict(conflict) => result.conflicts.push(conflict),
            }
        }
        result.has_conflicts = !result.conflicts.is_empty();

        debug!(
            groups = groups.len(),
            conflicts = result.conflicts.len(),
            "file name check completed"
        );
        Ok(result)
    }

    async fn lookup_group(&self, matter_id: &str, pending: &Pending) -> DomainResult<Vec<String>> {
        let names: Vec<String> = pending.iter().map(|(_, name)| name.clone()).collect();
        self.reader.matching_file_names(matter_id, &names).await
    }
}

fn classify(matter_id: &str, file_name: &str, stored: &[String]) -> Verdict {
    if let Some(existing) = stored.iter().find(|name| name.as_str() == file_name) {
        return conflict(
            matter_id,
            file_name,
            ConflictType::ExactMatch,
            Some(existing.clone()),
            "a document with this file name already exists",
        );
    }

    let lowered = file_name.to_lowercase();
    if let Some(existing) = stored.iter().find(|name| name.to_lowercase() == lowered) {
        return conflict(
            matter_id,
            file_name,
            ConflictType::CaseInsensitiveMatch,
            Some(existing.clone()),
            format!("a document named '{existing}' already exists"),
        );
    }

    Verdict::Available(FileNameRequest::new(matter_id, file_name))
}
