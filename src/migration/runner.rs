//! Execution coordinator
//!
//! Applies the resolved pending set strictly in order on a single
//! session. Each migration moves through Scheduled -> Running ->
//! Succeeded/Failed: `record_start` persists the Running attempt before
//! any statement executes, and `record_result` persists the outcome
//! before the next migration starts. Fail-fast by default.

use std::time::Instant;

use log::{info, warn};

use crate::executor::{SqlError, SqlExecutor};
use crate::migration::history::HistoryStore;
use crate::migration::report::{ExecutionReport, RunOutcome};
use crate::migration::{MigrationError, MigrationSource};
use crate::transaction::TransactionScope;

#[cfg(feature = "tracing")]
use crate::trace;

/// Applies pending migrations and records every attempt
pub struct Runner<'a> {
    executor: &'a dyn SqlExecutor,
    history: &'a HistoryStore<'a>,
    continue_on_error: bool,
    migration_timeout_seconds: Option<u64>,
}

impl<'a> Runner<'a> {
    /// Create a runner over the executor and history store
    pub fn new(
        executor: &'a dyn SqlExecutor,
        history: &'a HistoryStore<'a>,
        continue_on_error: bool,
        migration_timeout_seconds: Option<u64>,
    ) -> Self {
        Self {
            executor,
            history,
            continue_on_error,
            migration_timeout_seconds,
        }
    }

    /// Apply the pending migrations in order.
    ///
    /// The caller must hold the migration lock and have run resolution;
    /// `pending` is applied as given. Execution halts at the first
    /// failure unless `continue_on_error` is set; either way the failed
    /// attempt is recorded before this returns.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MetadataUnavailable` if an attempt cannot
    /// be recorded; statement failures are reported through the returned
    /// [`ExecutionReport`], not as errors.
    pub fn apply(&self, pending: &[MigrationSource]) -> Result<ExecutionReport, MigrationError> {
        let run_start = Instant::now();

        let mut applied_versions = Vec::new();
        let mut failed_version = None;
        let mut failure_cause = None;
        let mut warnings = Vec::new();

        for source in pending {
            #[cfg(feature = "tracing")]
            let _span =
                trace::migration_span(source.version.as_str(), &source.description).entered();

            info!(
                "applying migration {} ({})",
                source.version, source.description
            );

            let handle = self.history.record_start(source)?;
            let start = Instant::now();
            let result = self.run_statements(source, &mut warnings);
            let elapsed_ms = start.elapsed().as_millis() as i64;

            match result {
                Ok(()) => {
                    self.history.record_result(&handle, true, elapsed_ms)?;
                    info!("applied migration {} in {}ms", source.version, elapsed_ms);
                    applied_versions.push(source.version.clone());
                }
                Err(e) => {
                    self.history.record_result(&handle, false, elapsed_ms)?;
                    warn!(
                        "migration {} failed after {}ms: {}",
                        source.version, elapsed_ms, e
                    );
                    if failed_version.is_none() {
                        failed_version = Some(source.version.clone());
                        failure_cause = Some(e.to_string());
                    }
                    if !self.continue_on_error {
                        break;
                    }
                }
            }
        }

        let outcome = if failed_version.is_some() {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        };

        Ok(ExecutionReport {
            outcome,
            applied_versions,
            failed_version,
            failure_cause,
            anomalies: Vec::new(),
            warnings,
            total_execution_time_ms: run_start.elapsed().as_millis() as i64,
        })
    }

    fn run_statements(
        &self,
        source: &MigrationSource,
        warnings: &mut Vec<String>,
    ) -> Result<(), MigrationError> {
        let transactional = !source.requires_non_transactional();
        if !transactional {
            let warning = format!(
                "migration {} contains statements that cannot run in a transaction; applying non-atomically",
                source.version
            );
            warn!("{warning}");
            warnings.push(warning);
        }

        if let Some(secs) = self.migration_timeout_seconds {
            let _ = self
                .executor
                .execute(&format!("SET statement_timeout = '{secs}s'"), &[]);
        }

        let result = self.execute_script(&source.sql, transactional);

        if self.migration_timeout_seconds.is_some() {
            let _ = self.executor.execute("RESET statement_timeout", &[]);
        }

        result.map_err(|e| MigrationError::ExecutionFailed {
            version: source.version.to_string(),
            description: source.description.clone(),
            error: e.to_string(),
        })
    }

    fn execute_script(&self, sql: &str, transactional: bool) -> Result<(), SqlError> {
        if transactional {
            let tx = TransactionScope::begin(self.executor)?;
            self.executor.batch_execute(sql)?;
            // Dropping tx on the error path above rolls the script back
            tx.commit()
        } else {
            self.executor.batch_execute(sql)
        }
    }
}
