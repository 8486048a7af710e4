//! Migration engine for Floodgate
//!
//! This module provides the schema migration machinery:
//! - Versioned source discovery and descriptor parsing
//! - History table access and idempotent bootstrap
//! - Resolution of discovered sources against recorded history
//! - Ordered execution with per-attempt tracking
//! - Cluster-wide locking so concurrent runs serialize
//!
//! # Example
//!
//! ```rust,no_run
//! use floodgate::{connect, MayPostgresExecutor, MigrationConfig, Migrator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigrationConfig::default();
//! let client = connect(&config.url)?;
//! let executor = MayPostgresExecutor::new(client);
//!
//! let migrator = Migrator::new(config);
//! let report = migrator.migrate(&executor)?;
//! println!("applied {} migration(s)", report.applied_versions.len());
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod error;
pub mod history;
pub mod lock;
pub mod migrator;
pub mod report;
pub mod resolve;
pub mod runner;
pub mod source;
pub mod status;
pub mod version;

pub use checksum::calculate_checksum;
pub use error::MigrationError;
pub use history::{AppliedMigration, AttemptHandle, HistoryStore};
pub use lock::{HistoryTableLock, LockStrategy, MigrationLockGuard, SessionAdvisoryLock};
pub use migrator::Migrator;
pub use report::{ExecutionReport, RunOutcome};
pub use resolve::{resolve, Anomaly, AnomalyKind, MigrationState, Resolution, ResolutionPolicy};
pub use runner::Runner;
pub use source::{collect_sources, DirectorySourceProvider, MigrationSource, SourceProvider};
pub use status::{MigrationStatus, PendingMigration};
pub use version::MigrationVersion;
