//! Cluster-wide migration locking
//!
//! Concurrent invocations across processes serialize on an advisory,
//! store-native lock. The lock primitive sits behind [`LockStrategy`]
//! so the guard logic stays store-agnostic; two adapters ship:
//!
//! - [`HistoryTableLock`] (default): Flyway-style, uses the history
//!   table itself. The process that inserts the reserved lock row holds
//!   the lock.
//! - [`SessionAdvisoryLock`]: `pg_try_advisory_lock` on a key derived
//!   from the history table name.

use std::time::{Duration, Instant};

use log::warn;

use crate::executor::SqlExecutor;
use crate::migration::history::LOCK_RANK;
use crate::migration::MigrationError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Advisory lock capability: acquire within a timeout, release
pub trait LockStrategy {
    /// Acquire the lock, blocking up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock is not acquired
    /// within the timeout, or `MigrationError::Database` on other
    /// failures.
    fn acquire(&self, executor: &dyn SqlExecutor, timeout: Duration) -> Result<(), MigrationError>;

    /// Release the lock.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the release statement fails.
    fn release(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError>;
}

/// Flyway-style lock using the history table itself
///
/// The process that successfully inserts the reserved lock row
/// (`installed_rank = -1`) holds the lock; the `PRIMARY KEY` constraint
/// makes the insert atomic.
pub struct HistoryTableLock {
    table: String,
}

impl HistoryTableLock {
    /// Create a lock over the given history table
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl LockStrategy for HistoryTableLock {
    fn acquire(&self, executor: &dyn SqlExecutor, timeout: Duration) -> Result<(), MigrationError> {
        let start = Instant::now();

        // A short per-query timeout keeps a hanging insert from eating
        // the whole acquisition window; the loop enforces the overall
        // timeout. statement_timeout is session-level, reset afterwards.
        let _ = executor.execute("SET statement_timeout = '5s'", &[]);

        loop {
            if start.elapsed() >= timeout {
                let _ = executor.execute("RESET statement_timeout", &[]);
                return Err(MigrationError::LockTimeout(format!(
                    "failed to acquire migration lock within {} seconds. \
                     Another process may be running migrations. If this persists, check for \
                     stuck migration processes or manually delete the lock record: \
                     DELETE FROM {} WHERE installed_rank = {}",
                    timeout.as_secs(),
                    self.table,
                    LOCK_RANK
                )));
            }

            let sql = format!(
                "INSERT INTO {} (installed_rank, version, description, checksum, applied_by, applied_at, success) \
                 VALUES ({}, 'LOCK', 'migration lock', 'lock', current_user, NOW(), true) \
                 ON CONFLICT (installed_rank) DO NOTHING",
                self.table, LOCK_RANK
            );

            let rows_affected = match executor.execute(&sql, &[]) {
                Ok(rows) => rows,
                Err(e) => {
                    let message = format!("{e}");
                    if message.contains("timeout") || message.contains("canceling statement") {
                        // The insert itself timed out; retry under the
                        // overall deadline
                        std::thread::sleep(POLL_INTERVAL);
                        continue;
                    }
                    let _ = executor.execute("RESET statement_timeout", &[]);
                    return Err(MigrationError::Database(e));
                }
            };

            if rows_affected > 0 {
                let _ = executor.execute("RESET statement_timeout", &[]);
                return Ok(());
            }

            // Lock held by another process
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn release(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
        let sql = format!(
            "DELETE FROM {} WHERE installed_rank = {}",
            self.table, LOCK_RANK
        );
        executor.execute(&sql, &[])?;
        Ok(())
    }
}

/// Session-scoped advisory lock via `pg_try_advisory_lock`
///
/// The lock disappears with the session, so a crashed run cannot leave a
/// stale lock behind (unlike the table-based variant).
pub struct SessionAdvisoryLock {
    key: i64,
}

impl SessionAdvisoryLock {
    /// Create a lock on an explicit key
    #[must_use]
    pub fn new(key: i64) -> Self {
        Self { key }
    }

    /// Derive a stable lock key from the history table name, so engines
    /// with distinct history tables don't contend.
    #[must_use]
    pub fn for_table(table: &str) -> Self {
        // FNV-1a 64
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in table.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        Self { key: hash as i64 }
    }
}

impl LockStrategy for SessionAdvisoryLock {
    fn acquire(&self, executor: &dyn SqlExecutor, timeout: Duration) -> Result<(), MigrationError> {
        let start = Instant::now();

        loop {
            let row = executor
                .query_one("SELECT pg_try_advisory_lock($1)", &[&self.key])
                .map_err(MigrationError::Database)?;
            let acquired: bool = row.get(0);

            if acquired {
                return Ok(());
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout(format!(
                    "failed to acquire advisory lock {} within {} seconds. \
                     Another process may be running migrations.",
                    self.key,
                    timeout.as_secs()
                )));
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn release(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
        executor.execute("SELECT pg_advisory_unlock($1)", &[&self.key])?;
        Ok(())
    }
}

/// Guard that releases the migration lock when dropped
///
/// Acquisition happens in [`new`](MigrationLockGuard::new); release runs
/// on every exit path, success, failure, or cancellation.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn SqlExecutor,
    strategy: Box<dyn LockStrategy>,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the lock and create the guard
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock cannot be
    /// acquired within `timeout`.
    pub fn new(
        executor: &'a dyn SqlExecutor,
        strategy: Box<dyn LockStrategy>,
        timeout: Duration,
    ) -> Result<Self, MigrationError> {
        strategy.acquire(executor, timeout)?;
        Ok(Self { executor, strategy })
    }

    /// The executor the lock was taken on
    pub fn executor(&self) -> &'a dyn SqlExecutor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        // Errors cannot propagate from drop
        if let Err(e) = self.strategy.release(self.executor) {
            warn!("failed to release migration lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_key_is_stable_per_table() {
        let a = SessionAdvisoryLock::for_table("floodgate_history");
        let b = SessionAdvisoryLock::for_table("floodgate_history");
        let c = SessionAdvisoryLock::for_table("other_history");
        assert_eq!(a.key, b.key);
        assert_ne!(a.key, c.key);
    }
}
