//! Migrator - the engine entry point
//!
//! Wires discovery, resolution, locking, and execution together behind a
//! configuration struct. One `Migrator` per target; the caller supplies
//! the executor (and therefore the session).

use std::time::Duration;

use log::{info, warn};

use crate::config::{LockStrategyKind, MigrationConfig};
use crate::executor::SqlExecutor;
use crate::migration::history::HistoryStore;
use crate::migration::lock::{
    HistoryTableLock, LockStrategy, MigrationLockGuard, SessionAdvisoryLock,
};
use crate::migration::report::ExecutionReport;
use crate::migration::resolve::{resolve, Resolution, ResolutionPolicy};
use crate::migration::runner::Runner;
use crate::migration::source::{collect_sources, DirectorySourceProvider, SourceProvider};
use crate::migration::status::{MigrationStatus, PendingMigration};
use crate::migration::{MigrationError, MigrationSource};

/// Core migration engine
///
/// Orchestrates migration discovery, resolution, locking, execution, and
/// history tracking against a single target.
pub struct Migrator {
    config: MigrationConfig,
}

impl Migrator {
    /// Create a new `Migrator` from its configuration
    #[must_use]
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// The engine configuration
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Discover migration sources from the configured locations
    ///
    /// Locations are merged in order; versions must be unique across all
    /// of them.
    ///
    /// # Errors
    ///
    /// Returns descriptor, version, or duplicate errors from discovery.
    pub fn discover(&self) -> Result<Vec<MigrationSource>, MigrationError> {
        let providers: Vec<Box<dyn SourceProvider>> = self
            .config
            .locations
            .iter()
            .map(|root| Box::new(DirectorySourceProvider::new(root)) as Box<dyn SourceProvider>)
            .collect();

        collect_sources(&providers)
    }

    /// Get migration status (applied vs pending, plus anomalies)
    ///
    /// Read-only: bootstraps the history table if absent, but never
    /// mutates the schema or history rows.
    ///
    /// # Errors
    ///
    /// Returns discovery or metadata errors.
    pub fn status(&self, executor: &dyn SqlExecutor) -> Result<MigrationStatus, MigrationError> {
        self.config.validate()?;

        let store = HistoryStore::new(executor, &self.config.history_table);
        store.bootstrap()?;

        let history = store.load()?;
        let discovered = self.discover()?;
        let resolution = resolve(discovered, &history, &self.policy());

        let pending: Vec<PendingMigration> =
            resolution.pending.iter().map(PendingMigration::from).collect();
        let applied = history.into_iter().filter(|r| r.success).collect();

        Ok(MigrationStatus::new(applied, pending, resolution.anomalies))
    }

    /// Validate recorded history against the discovered sources
    ///
    /// # Errors
    ///
    /// Returns the first anomaly as its error form (checksum mismatch,
    /// out-of-order, missing file, failed attempt, duplicate), or
    /// discovery/metadata errors.
    pub fn validate(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
        self.resolution(executor)?.ensure_clean()
    }

    /// Apply all pending migrations
    ///
    /// Bootstraps the history table, acquires the migration lock,
    /// resolves under the lock, and applies the pending set in order.
    /// The lock is released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the guard cannot be
    /// acquired, and discovery/metadata errors. Resolution anomalies and
    /// statement failures are reported through the returned
    /// [`ExecutionReport`].
    pub fn migrate(&self, executor: &dyn SqlExecutor) -> Result<ExecutionReport, MigrationError> {
        self.config.validate()?;

        let store = HistoryStore::new(executor, &self.config.history_table);
        store.bootstrap()?;

        let _lock = MigrationLockGuard::new(
            executor,
            self.lock_strategy(),
            Duration::from_secs(self.config.lock_timeout_seconds),
        )?;

        // Resolve under the lock: a concurrent run may have applied the
        // set while we waited
        let history = store.load()?;
        let discovered = self.discover()?;
        let resolution = resolve(discovered, &history, &self.policy());

        if !resolution.is_clean() {
            for anomaly in &resolution.anomalies {
                warn!("{anomaly}");
            }
            return Ok(ExecutionReport::validation_failure(resolution.anomalies));
        }

        if resolution.pending.is_empty() {
            info!("schema is up to date");
            return Ok(ExecutionReport::up_to_date());
        }

        info!("{} pending migration(s)", resolution.pending.len());

        let runner = Runner::new(
            executor,
            &store,
            self.config.continue_on_error,
            self.config.migration_timeout_seconds,
        );
        runner.apply(&resolution.pending)
    }

    fn resolution(&self, executor: &dyn SqlExecutor) -> Result<Resolution, MigrationError> {
        self.config.validate()?;

        let store = HistoryStore::new(executor, &self.config.history_table);
        store.bootstrap()?;

        let history = store.load()?;
        let discovered = self.discover()?;
        Ok(resolve(discovered, &history, &self.policy()))
    }

    fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            out_of_order: self.config.out_of_order,
        }
    }

    fn lock_strategy(&self) -> Box<dyn LockStrategy> {
        match self.config.lock_strategy {
            LockStrategyKind::HistoryTable => {
                Box::new(HistoryTableLock::new(&self.config.history_table))
            }
            LockStrategyKind::Advisory => {
                Box::new(SessionAdvisoryLock::for_table(&self.config.history_table))
            }
        }
    }
}
