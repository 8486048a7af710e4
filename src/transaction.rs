//! Transactional scope for migration execution
//!
//! Each migration's statements run inside a single transaction on the
//! session held by the executor, so a failed script leaves no partial
//! schema changes behind (PostgreSQL DDL is transactional).

use crate::executor::{SqlError, SqlExecutor};

/// RAII transaction over the executor's session.
///
/// `BEGIN` is issued on construction. If the scope is dropped without an
/// explicit [`commit`](TransactionScope::commit), a `ROLLBACK` is attempted.
pub struct TransactionScope<'a> {
    executor: &'a dyn SqlExecutor,
    open: bool,
}

impl<'a> TransactionScope<'a> {
    /// Start a new transaction on the executor's session.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if `BEGIN` fails.
    pub fn begin(executor: &'a dyn SqlExecutor) -> Result<Self, SqlError> {
        executor.execute("BEGIN", &[])?;
        Ok(Self {
            executor,
            open: true,
        })
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if `COMMIT` fails; the session state is then
    /// whatever PostgreSQL left it in (usually aborted and rolled back).
    pub fn commit(mut self) -> Result<(), SqlError> {
        self.open = false;
        self.executor.execute("COMMIT", &[]).map(|_| ())
    }

    /// Roll the transaction back explicitly.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if `ROLLBACK` fails.
    pub fn rollback(mut self) -> Result<(), SqlError> {
        self.open = false;
        self.executor.execute("ROLLBACK", &[]).map(|_| ())
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.open {
            // Errors cannot propagate from drop
            let _ = self.executor.execute("ROLLBACK", &[]);
        }
    }
}
