//! PostgreSQL storage implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use crate::error::{HealthStatus, PoolStats, StorageError, StorageResult};
use crate::traits::{
    canonical_record_id, validate_file_name, Collection, DocumentRecord, Link, MatterRecord,
    RecordStore, RevisionRecord,
};

/// Default health check timeout in seconds.
/// Uses a shorter timeout than regular queries since health checks should be fast.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum time to wait for a single query before it is cancelled and
    /// reported as `StorageError::QueryTimeout`.
    pub query_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/lexval".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// PostgreSQL implementation of RecordStore.
pub struct PostgresRecordStore {
    pool: PgPool,
    query_timeout: Duration,
    health_check_timeout: Duration,
}

/// Set-membership query over live rows of one collection.
fn existing_ids_sql(collection: Collection) -> String {
    format!(
        "SELECT id FROM {} WHERE id = ANY($1) AND deleted_at IS NULL",
        collection.table_name()
    )
}

/// Pair-restricted foreign key query against the child collection.
///
/// `$1` holds parent ids and `$2` child ids, position-aligned.
fn linked_pairs_sql(link: Link) -> String {
    format!(
        "SELECT c.{fk} AS parent_id, c.id AS child_id \
         FROM {child} c \
         JOIN UNNEST($1::text[], $2::text[]) AS p(parent_id, child_id) \
           ON c.id = p.child_id AND c.{fk} = p.parent_id \
         WHERE c.deleted_at IS NULL",
        fk = link.foreign_key(),
        child = link.child().table_name(),
    )
}

fn soft_delete_sql(collection: Collection) -> String {
    format!(
        "UPDATE {} SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        collection.table_name()
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

fn query_error(context: &str, err: sqlx::Error) -> StorageError {
    StorageError::QueryError {
        message: format!("{context}: {err}"),
    }
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store from a connection pool.
    ///
    /// Uses default query timeout of 30 seconds for all operations.
    pub fn new(pool: PgPool) -> Self {
        Self::with_timeout(pool, Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }

    /// Creates a new PostgreSQL record store with a custom query timeout.
    pub fn with_timeout(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
        }
    }

    /// Creates a new PostgreSQL record store with the given configuration.
    #[instrument(skip(config))]
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            health_check_timeout: Duration::from_secs(config.health_check_timeout_secs),
        })
    }

    /// Creates a new PostgreSQL record store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = PostgresConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wraps an async operation with the query timeout and records metrics.
    ///
    /// # Metrics
    /// - `lexval_storage_query_duration_seconds` - Histogram of query durations
    /// - `lexval_storage_query_timeout_total` - Counter of timeout events
    async fn execute_with_timeout<T, F>(&self, operation: &str, future: F) -> StorageResult<T>
    where
        F: std::future::Future<Output = StorageResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.query_timeout, future).await;
        let duration = start.elapsed().as_secs_f64();

        let (status, final_result) = match result {
            Ok(Ok(value)) => ("success", Ok(value)),
            Ok(Err(e)) => ("error", Err(e)),
            Err(_elapsed) => (
                "timeout",
                Err(StorageError::QueryTimeout {
                    operation: operation.to_string(),
                    timeout: self.query_timeout,
                }),
            ),
        };

        metrics::histogram!(
            "lexval_storage_query_duration_seconds",
            "operation" => operation.to_string(),
            "backend" => "postgres",
            "status" => status
        )
        .record(duration);

        if status == "timeout" {
            metrics::counter!(
                "lexval_storage_query_timeout_total",
                "operation" => operation.to_string(),
                "backend" => "postgres"
            )
            .increment(1);
        }

        final_result
    }

    /// Runs database migrations to create required tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS matters (
                id VARCHAR(128) PRIMARY KEY,
                name VARCHAR(512) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMP WITH TIME ZONE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id VARCHAR(128) PRIMARY KEY,
                matter_id VARCHAR(128) NOT NULL REFERENCES matters(id),
                file_name VARCHAR(255) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMP WITH TIME ZONE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS revisions (
                id VARCHAR(128) PRIMARY KEY,
                document_id VARCHAR(128) NOT NULL REFERENCES documents(id),
                revision_number INTEGER NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMP WITH TIME ZONE
            )
            "#,
            // Partial indexes keep live-row lookups cheap
            "CREATE INDEX IF NOT EXISTS idx_documents_matter_live \
             ON documents (matter_id) WHERE deleted_at IS NULL",
            "CREATE INDEX IF NOT EXISTS idx_documents_file_name_lower \
             ON documents (matter_id, LOWER(file_name)) WHERE deleted_at IS NULL",
            "CREATE INDEX IF NOT EXISTS idx_revisions_document_live \
             ON revisions (document_id) WHERE deleted_at IS NULL",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| query_error("migration failed", e))?;
        }

        debug!("Database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn existing_ids(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> StorageResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = existing_ids_sql(collection);
        let pool = &self.pool;
        self.execute_with_timeout("existing_ids", async {
            sqlx::query_scalar::<_, String>(&sql)
                .bind(ids.to_vec())
                .fetch_all(pool)
                .await
                .map_err(|e| query_error("failed to query existing ids", e))
        })
        .await
    }

    #[instrument(skip(self, pairs), fields(count = pairs.len()))]
    async fn linked_pairs(
        &self,
        link: Link,
        pairs: &[(String, String)],
    ) -> StorageResult<Vec<(String, String)>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let (parents, children): (Vec<String>, Vec<String>) = pairs.iter().cloned().unzip();
        let sql = linked_pairs_sql(link);
        let pool = &self.pool;
        self.execute_with_timeout("linked_pairs", async {
            sqlx::query_as::<_, (String, String)>(&sql)
                .bind(parents)
                .bind(children)
                .fetch_all(pool)
                .await
                .map_err(|e| query_error("failed to query linked pairs", e))
        })
        .await
    }

    #[instrument(skip(self, file_names), fields(count = file_names.len()))]
    async fn matching_file_names(
        &self,
        matter_id: &str,
        file_names: &[String],
    ) -> StorageResult<Vec<String>> {
        if file_names.is_empty() {
            return Ok(Vec::new());
        }

        let lowered: Vec<String> = file_names.iter().map(|n| n.to_lowercase()).collect();
        let pool = &self.pool;
        self.execute_with_timeout("matching_file_names", async {
            sqlx::query_scalar::<_, String>(
                "SELECT file_name FROM documents \
                 WHERE matter_id = $1 AND deleted_at IS NULL AND LOWER(file_name) = ANY($2) \
                 ORDER BY file_name",
            )
            .bind(matter_id)
            .bind(lowered)
            .fetch_all(pool)
            .await
            .map_err(|e| query_error("failed to query file names", e))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();

        // Uses a shorter dedicated timeout since health checks should be fast
        let check_result = tokio::time::timeout(self.health_check_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::HealthCheckFailed {
                    message: format!("database ping failed: {e}"),
                })
        })
        .await;

        let latency = start.elapsed();

        let status = match &check_result {
            Ok(Ok(_)) => "success",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };

        metrics::histogram!(
            "lexval_storage_health_check_duration_seconds",
            "backend" => "postgres",
            "status" => status
        )
        .record(latency.as_secs_f64());

        match check_result {
            Ok(result) => {
                result?;
            }
            Err(_elapsed) => {
                metrics::counter!(
                    "lexval_storage_query_timeout_total",
                    "operation" => "health_check",
                    "backend" => "postgres"
                )
                .increment(1);
                return Err(StorageError::QueryTimeout {
                    operation: "health_check".to_string(),
                    timeout: self.health_check_timeout,
                });
            }
        }

        // Note: pool.size() returns total connections, so active = size - idle
        let total_connections = self.pool.size();
        let idle_connections = self.pool.num_idle() as u32;
        let active_connections = total_connections.saturating_sub(idle_connections);
        let max_connections = self.pool.options().get_max_connections();

        metrics::gauge!(
            "lexval_storage_pool_connections",
            "backend" => "postgres",
            "state" => "active"
        )
        .set(active_connections as f64);

        metrics::gauge!(
            "lexval_storage_pool_connections",
            "backend" => "postgres",
            "state" => "idle"
        )
        .set(idle_connections as f64);

        Ok(HealthStatus {
            healthy: true,
            latency,
            pool_stats: Some(PoolStats {
                active_connections,
                idle_connections,
                max_connections,
            }),
            message: Some("postgresql".to_string()),
        })
    }

    #[instrument(skip(self, matter), fields(id = %matter.id))]
    async fn create_matter(&self, mut matter: MatterRecord) -> StorageResult<()> {
        matter.id = canonical_record_id(&matter.id)?;

        let pool = &self.pool;
        let id = matter.id.clone();
        self.execute_with_timeout("create_matter", async {
            sqlx::query(
                "INSERT INTO matters (id, name, created_at, deleted_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(&matter.id)
            .bind(&matter.name)
            .bind(matter.created_at)
            .bind(matter.deleted_at)
            .execute(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::RecordAlreadyExists {
                        collection: Collection::Matters.to_string(),
                        id,
                    }
                } else {
                    query_error("failed to create matter", e)
                }
            })
        })
        .await?;

        Ok(())
    }

    #[instrument(skip(self, document), fields(id = %document.id))]
    async fn create_document(&self, mut document: DocumentRecord) -> StorageResult<()> {
        document.id = canonical_record_id(&document.id)?;
        document.matter_id = canonical_record_id(&document.matter_id)?;
        validate_file_name(&document.file_name)?;

        let pool = &self.pool;
        let id = document.id.clone();
        let result = self
            .execute_with_timeout("create_document", async {
                sqlx::query(
                    "INSERT INTO documents (id, matter_id, file_name, created_at, deleted_at) \
                     SELECT $1, $2, $3, $4, $5 \
                     WHERE EXISTS (SELECT 1 FROM matters WHERE id = $2 AND deleted_at IS NULL)",
                )
                .bind(&document.id)
                .bind(&document.matter_id)
                .bind(&document.file_name)
                .bind(document.created_at)
                .bind(document.deleted_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StorageError::RecordAlreadyExists {
                            collection: Collection::Documents.to_string(),
                            id,
                        }
                    } else {
                        query_error("failed to create document", e)
                    }
                })
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ParentNotFound {
                collection: Collection::Matters.to_string(),
                id: document.matter_id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, revision), fields(id = %revision.id))]
    async fn create_revision(&self, mut revision: RevisionRecord) -> StorageResult<()> {
        revision.id = canonical_record_id(&revision.id)?;
        revision.document_id = canonical_record_id(&revision.document_id)?;

        let pool = &self.pool;
        let id = revision.id.clone();
        let result = self
            .execute_with_timeout("create_revision", async {
                sqlx::query(
                    "INSERT INTO revisions (id, document_id, revision_number, created_at, deleted_at) \
                     SELECT $1, $2, $3, $4, $5 \
                     WHERE EXISTS (SELECT 1 FROM documents WHERE id = $2 AND deleted_at IS NULL)",
                )
                .bind(&revision.id)
                .bind(&revision.document_id)
                .bind(revision.revision_number)
                .bind(revision.created_at)
                .bind(revision.deleted_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StorageError::RecordAlreadyExists {
                            collection: Collection::Revisions.to_string(),
                            id,
                        }
                    } else {
                        query_error("failed to create revision", e)
                    }
                })
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ParentNotFound {
                collection: Collection::Documents.to_string(),
                id: revision.document_id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        let id = canonical_record_id(id)?;
        let sql = soft_delete_sql(collection);
        let pool = &self.pool;
        let result = self
            .execute_with_timeout("soft_delete", async {
                sqlx::query(&sql)
                    .bind(&id)
                    .execute(pool)
                    .await
                    .map_err(|e| query_error("failed to soft-delete record", e))
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RecordNotFound {
                collection: collection.to_string(),
                id,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for PostgresRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRecordStore")
            .field("pool", &"PgPool")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
