//! `SqlExecutor` Module
//!
//! Provides the `SqlExecutor` trait that abstracts database execution over
//! `may_postgres`. The migration engine performs all database work through
//! this trait, so history access, locking, and statement execution stay
//! independent of how the connection was obtained.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::trace;

/// `SqlExecutor` error type
#[derive(Debug)]
pub enum SqlError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Query execution error
    Query(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            SqlError::Query(s) => write!(f, "Query error: {s}"),
            SqlError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}

impl From<PostgresError> for SqlError {
    fn from(err: PostgresError) -> Self {
        SqlError::Postgres(err)
    }
}

/// Trait for executing database operations
///
/// Abstracts database execution so the engine can run against a direct
/// client or anything else that can execute SQL on a single session.
pub trait SqlExecutor {
    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the query execution fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, SqlError>;

    /// Execute a query and return a single row
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the query fails or does not return exactly
    /// one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, SqlError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the query execution fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, SqlError>;

    /// Run a multi-statement script through the simple-query protocol.
    ///
    /// Migration scripts routinely contain several statements separated by
    /// semicolons; the extended protocol used by [`execute`](Self::execute)
    /// only accepts one statement at a time.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if any statement in the script fails.
    fn batch_execute(&self, script: &str) -> Result<(), SqlError>;
}

/// Implementation of `SqlExecutor` for `may_postgres::Client`
///
/// This is the primary executor implementation, holding one session for
/// the lifetime of a migration run.
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Consume the executor and return the underlying client
    pub fn into_client(self) -> Client {
        self.client
    }

    /// Check if the underlying connection is healthy
    ///
    /// Executes `SELECT 1` to verify the session is still alive.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the health check query itself fails to run.
    pub fn check_health(&self) -> Result<bool, SqlError> {
        crate::connection::check_connection_health(&self.client)
            .map_err(|e| SqlError::Other(format!("Health check error: {e}")))
    }
}

impl SqlExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, SqlError> {
        #[cfg(feature = "tracing")]
        let _span = trace::query_span(query).entered();

        self.client
            .execute(query, params)
            .map_err(SqlError::Postgres)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, SqlError> {
        #[cfg(feature = "tracing")]
        let _span = trace::query_span(query).entered();

        self.client
            .query_one(query, params)
            .map_err(SqlError::Postgres)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, SqlError> {
        #[cfg(feature = "tracing")]
        let _span = trace::query_span(query).entered();

        self.client.query(query, params).map_err(SqlError::Postgres)
    }

    fn batch_execute(&self, script: &str) -> Result<(), SqlError> {
        #[cfg(feature = "tracing")]
        let _span = trace::query_span(script).entered();

        self.client.batch_execute(script).map_err(SqlError::Postgres)
    }
}
