//! Migration-specific error types

use std::path::PathBuf;

use crate::executor::SqlError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// A `V`-prefixed source file that does not follow the naming convention
    InvalidDescriptor(String),
    /// Version text that is not a dotted numeric sequence
    InvalidVersion(String),
    /// Two sources resolve to the same version
    DuplicateVersion {
        version: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// An applied migration whose on-disk content has changed
    ChecksumMismatch {
        version: String,
        description: String,
        stored: String,
        current: String,
    },
    /// A pending migration below the highest applied version
    OutOfOrder {
        version: String,
        highest_applied: String,
    },
    /// An applied migration with no matching source on disk
    MissingFile { version: String, description: String },
    /// A history row recorded with `success = false`
    FailedAttempt { version: String, description: String },
    /// The history store is unreachable or a history write failed
    MetadataUnavailable(String),
    /// Migration lock timeout
    LockTimeout(String),
    /// Migration failed during execution
    ExecutionFailed {
        version: String,
        description: String,
        error: String,
    },
    /// Invalid engine configuration
    Configuration(String),
    /// Database execution error
    Database(SqlError),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::InvalidDescriptor(msg) => {
                write!(f, "Invalid migration descriptor: {}", msg)
            }
            MigrationError::InvalidVersion(text) => {
                write!(
                    f,
                    "Invalid migration version '{}': expected a dotted numeric sequence like 1, 4.2 or 20240120120000",
                    text
                )
            }
            MigrationError::DuplicateVersion {
                version,
                first,
                second,
            } => {
                write!(
                    f,
                    "Duplicate migration version {}: both {} and {} resolve to it",
                    version,
                    first.display(),
                    second.display()
                )
            }
            MigrationError::ChecksumMismatch {
                version,
                description,
                stored,
                current,
            } => {
                write!(
                    f,
                    "Migration '{}' (version {}) has been modified after being applied.\n\
                     Stored checksum: {}\n\
                     Current checksum: {}\n\
                     This indicates the migration file was edited after deployment.",
                    description, version, stored, current
                )
            }
            MigrationError::OutOfOrder {
                version,
                highest_applied,
            } => {
                write!(
                    f,
                    "Migration version {} is below the highest applied version {} and out-of-order execution is disabled.\n\
                     Enable out_of_order to accept it, or renumber the migration.",
                    version, highest_applied
                )
            }
            MigrationError::MissingFile {
                version,
                description,
            } => {
                write!(
                    f,
                    "Applied migration '{}' (version {}) has no matching source on disk.\n\
                     Suggestion: ensure all migration files are present in the configured locations",
                    description, version
                )
            }
            MigrationError::FailedAttempt {
                version,
                description,
            } => {
                write!(
                    f,
                    "Migration '{}' (version {}) has a failed attempt recorded in the history table.\n\
                     An earlier run halted mid-migration; the schema may be in an intermediate state.\n\
                     Inspect the target and remove the failed history row before retrying.",
                    description, version
                )
            }
            MigrationError::MetadataUnavailable(msg) => {
                write!(f, "Migration history store unavailable: {}", msg)
            }
            MigrationError::LockTimeout(msg) => {
                write!(
                    f,
                    "Migration lock timeout: {}\n\
                     Another process may be running migrations. If this persists, check for:\n\
                     - A stuck migration process\n\
                     - Database connection issues\n\
                     - A stale lock record left by a crashed run",
                    msg
                )
            }
            MigrationError::ExecutionFailed {
                version,
                description,
                error,
            } => {
                write!(
                    f,
                    "Migration '{}' (version {}) failed during execution: {}",
                    description, version, error
                )
            }
            MigrationError::Configuration(msg) => {
                write!(f, "Invalid migration configuration: {}", msg)
            }
            MigrationError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<SqlError> for MigrationError {
    fn from(error: SqlError) -> Self {
        MigrationError::Database(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_display_names_the_version() {
        let err = MigrationError::ChecksumMismatch {
            version: "3".to_string(),
            description: "add accounts".to_string(),
            stored: "aaa".to_string(),
            current: "bbb".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("version 3"));
        assert!(text.contains("aaa"));
        assert!(text.contains("bbb"));
    }

    #[test]
    fn test_out_of_order_display_names_both_versions() {
        let err = MigrationError::OutOfOrder {
            version: "2".to_string(),
            highest_applied: "3".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("version 2"));
        assert!(text.contains("highest applied version 3"));
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = MigrationError::LockTimeout("after 5 seconds".to_string());
        assert!(err.to_string().contains("Migration lock timeout"));
    }

    #[test]
    fn test_duplicate_version_display_names_both_paths() {
        let err = MigrationError::DuplicateVersion {
            version: "1".to_string(),
            first: PathBuf::from("a/V1__x.sql"),
            second: PathBuf::from("b/V1__y.sql"),
        };
        let text = err.to_string();
        assert!(text.contains("V1__x.sql"));
        assert!(text.contains("V1__y.sql"));
    }
}
