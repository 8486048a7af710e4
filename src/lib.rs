//! # Floodgate
//!
//! Flyway-style PostgreSQL schema-migration engine built on `may_postgres`.
//!
//! Floodgate discovers `V<version>__<description>.sql` sources, compares
//! them against the history recorded in the target database, and applies
//! the pending set strictly in version order under a cluster-wide
//! migration lock. Concurrent runs from multiple processes serialize;
//! drift in already-applied migrations is detected by checksum and never
//! auto-healed.
//!
//! See [README on GitHub](https://github.com/microscaler/floodgate) for
//! full architecture.

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
#[cfg(feature = "tracing")]
pub mod trace;
pub mod transaction;

pub use config::{LockStrategyKind, MigrationConfig};
pub use connection::{connect, ConnectionError};
pub use executor::{MayPostgresExecutor, SqlError, SqlExecutor};
pub use migration::{ExecutionReport, MigrationError, Migrator, RunOutcome};
