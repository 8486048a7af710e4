//! Migration history store
//!
//! Reads and writes the history table in the target database. The table
//! is append-only under normal operation: one row per application
//! attempt, keyed by `installed_rank`, a monotone counter. Rank `-1` is
//! reserved for the lock record and never surfaces as history.

use chrono::{DateTime, Utc};
use sea_query::{Alias, ColumnDef, Expr, Index, PostgresQueryBuilder, Table};
use serde::Serialize;

use crate::executor::{SqlError, SqlExecutor};
use crate::migration::{MigrationError, MigrationSource, MigrationVersion};

/// Rank reserved for the lock record; real history rows use ranks >= 1.
pub const LOCK_RANK: i32 = -1;

/// A history row: one application attempt of one migration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMigration {
    /// Monotone application counter and primary key
    pub installed_rank: i32,

    /// Migration version
    pub version: MigrationVersion,

    /// Human-readable migration description
    pub description: String,

    /// SHA-256 checksum of the migration content at apply time
    pub checksum: String,

    /// Database role that ran the migration
    pub applied_by: String,

    /// When the attempt started
    pub applied_at: DateTime<Utc>,

    /// Execution time in milliseconds (`None` while the attempt is running)
    pub execution_time_ms: Option<i64>,

    /// Whether the attempt completed successfully
    pub success: bool,
}

impl AppliedMigration {
    /// Create an `AppliedMigration` from a database row
    ///
    /// Expected column order: `installed_rank`, `version`, `description`,
    /// `checksum`, `applied_by`, `applied_at`, `execution_time_ms`,
    /// `success`.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the recorded version or timestamp
    /// cannot be parsed.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, MigrationError> {
        let installed_rank: i32 = row.get(0);
        let version_text: String = row.get(1);
        let version = MigrationVersion::parse(&version_text)?;
        let description: String = row.get(2);
        let checksum: String = row.get(3);
        let applied_by: String = row.get(4);

        // PostgreSQL TIMESTAMP comes back as a string from may_postgres
        let applied_at_str: String = row.get(5);
        let applied_at = parse_timestamp(&applied_at_str)?;

        let execution_time_ms: Option<i64> = row.get(6);
        let success: bool = row.get(7);

        Ok(Self {
            installed_rank,
            version,
            description,
            checksum,
            applied_by,
            applied_at,
            execution_time_ms,
            success,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, MigrationError> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for format in FORMATS {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(MigrationError::MetadataUnavailable(format!(
        "failed to parse timestamp '{text}': unrecognized format"
    )))
}

/// Handle for an in-flight application attempt
///
/// Returned by [`HistoryStore::record_start`] and consumed by
/// [`HistoryStore::record_result`].
#[derive(Debug)]
pub struct AttemptHandle {
    rank: i32,
}

impl AttemptHandle {
    /// The rank allocated to this attempt
    #[must_use]
    pub fn rank(&self) -> i32 {
        self.rank
    }
}

/// Accessor for the migration history table
///
/// All reads and writes of recorded migration state flow through this
/// struct; nothing else in the engine touches the table.
pub struct HistoryStore<'a> {
    executor: &'a dyn SqlExecutor,
    table: String,
}

impl<'a> HistoryStore<'a> {
    /// Create a store for `table` on the given executor
    pub fn new(executor: &'a dyn SqlExecutor, table: impl Into<String>) -> Self {
        Self {
            executor,
            table: table.into(),
        }
    }

    /// The history table name
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the history table and its index if they don't exist
    ///
    /// Idempotent: safe to call on every invocation, including
    /// concurrently from multiple processes.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MetadataUnavailable` if the DDL cannot be
    /// executed.
    pub fn bootstrap(&self) -> Result<(), MigrationError> {
        let table = Table::create()
            .table(Alias::new(&self.table))
            .if_not_exists()
            .col(
                ColumnDef::new(Alias::new("installed_rank"))
                    .integer()
                    .not_null()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(Alias::new("version"))
                    .string()
                    .string_len(50)
                    .not_null(),
            )
            .col(
                ColumnDef::new(Alias::new("description"))
                    .string()
                    .string_len(200)
                    .not_null(),
            )
            .col(
                ColumnDef::new(Alias::new("checksum"))
                    .string()
                    .string_len(64)
                    .not_null(),
            )
            .col(
                ColumnDef::new(Alias::new("applied_by"))
                    .string()
                    .string_len(100)
                    .not_null(),
            )
            .col(
                ColumnDef::new(Alias::new("applied_at"))
                    .timestamp()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Alias::new("execution_time_ms"))
                    .big_integer()
                    .null(),
            )
            .col(
                ColumnDef::new(Alias::new("success"))
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .to_owned();

        let sql = table.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map_err(unavailable)?;

        let index = Index::create()
            .if_not_exists()
            .name(format!("idx_{}_applied_at", self.table))
            .table(Alias::new(&self.table))
            .col(Expr::col(Alias::new("applied_at")))
            .to_owned();

        let sql = index.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map_err(unavailable)?;

        Ok(())
    }

    /// Load the recorded history, ordered by `installed_rank`
    ///
    /// The lock record is excluded.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MetadataUnavailable` if the table cannot
    /// be read, or a parse error for corrupt rows.
    pub fn load(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        let sql = format!(
            "SELECT installed_rank, version, description, checksum, applied_by, applied_at, execution_time_ms, success \
             FROM {} WHERE installed_rank > 0 ORDER BY installed_rank ASC",
            self.table
        );

        let rows = self.executor.query_all(&sql, &[]).map_err(unavailable)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(AppliedMigration::from_row(row)?);
        }

        Ok(records)
    }

    /// Record the start of an application attempt
    ///
    /// Inserts the attempt row with `success = false` and no execution
    /// time; [`record_result`](Self::record_result) completes it. An
    /// interrupted run therefore leaves evidence in the table rather than
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MetadataUnavailable` if the insert fails.
    pub fn record_start(&self, source: &MigrationSource) -> Result<AttemptHandle, MigrationError> {
        let sql = format!(
            "INSERT INTO {t} (installed_rank, version, description, checksum, applied_by, applied_at, execution_time_ms, success) \
             VALUES ((SELECT COALESCE(MAX(installed_rank), 0) + 1 FROM {t} WHERE installed_rank > 0), $1, $2, $3, current_user, $4, NULL, false) \
             RETURNING installed_rank",
            t = self.table
        );

        let version = source.version.to_string();
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.f").to_string();

        let row = self
            .executor
            .query_one(
                &sql,
                &[&version, &source.description, &source.checksum, &timestamp],
            )
            .map_err(unavailable)?;

        let rank: i32 = row.get(0);
        Ok(AttemptHandle { rank })
    }

    /// Record the outcome of an application attempt
    ///
    /// Must be durable before the coordinator moves to the next
    /// migration; durability is the underlying store's commit semantics.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MetadataUnavailable` if the update fails.
    pub fn record_result(
        &self,
        handle: &AttemptHandle,
        success: bool,
        execution_time_ms: i64,
    ) -> Result<(), MigrationError> {
        let sql = format!(
            "UPDATE {} SET success = $1, execution_time_ms = $2 WHERE installed_rank = $3",
            self.table
        );

        self.executor
            .execute(&sql, &[&success, &execution_time_ms, &handle.rank])
            .map_err(unavailable)?;

        Ok(())
    }
}

fn unavailable(e: SqlError) -> MigrationError {
    MigrationError::MetadataUnavailable(e.to_string())
}
