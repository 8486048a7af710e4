//! Migration status view

use serde::Serialize;
use std::path::PathBuf;

use crate::migration::{Anomaly, AppliedMigration, MigrationSource, MigrationVersion};

/// Snapshot of applied vs pending migrations
#[derive(Debug, Serialize)]
pub struct MigrationStatus {
    /// Successfully applied migrations (from the history table)
    pub applied: Vec<AppliedMigration>,

    /// Pending migrations (from the configured locations)
    pub pending: Vec<PendingMigration>,

    /// Anomalies found during resolution
    pub anomalies: Vec<Anomaly>,

    /// Number of applied migrations
    pub applied_count: usize,

    /// Number of pending migrations
    pub pending_count: usize,
}

/// A pending migration, as shown by `status`
#[derive(Debug, Clone, Serialize)]
pub struct PendingMigration {
    /// Migration version
    pub version: MigrationVersion,

    /// Migration description
    pub description: String,

    /// Source path
    pub path: PathBuf,

    /// Checksum of the current content
    pub checksum: String,
}

impl From<&MigrationSource> for PendingMigration {
    fn from(source: &MigrationSource) -> Self {
        Self {
            version: source.version.clone(),
            description: source.description.clone(),
            path: source.path.clone(),
            checksum: source.checksum.clone(),
        }
    }
}

impl MigrationStatus {
    /// Create a new `MigrationStatus`
    #[must_use]
    pub fn new(
        applied: Vec<AppliedMigration>,
        pending: Vec<PendingMigration>,
        anomalies: Vec<Anomaly>,
    ) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();

        Self {
            applied,
            pending,
            anomalies,
            applied_count,
            pending_count,
        }
    }

    /// Whether the target is fully migrated and free of anomalies
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.anomalies.is_empty()
    }

    /// The highest successfully applied version
    #[must_use]
    pub fn latest_applied_version(&self) -> Option<&MigrationVersion> {
        self.applied.iter().map(|m| &m.version).max()
    }

    /// The next version that would be applied
    #[must_use]
    pub fn next_pending_version(&self) -> Option<&MigrationVersion> {
        self.pending.first().map(|m| &m.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn applied(version: &str) -> AppliedMigration {
        AppliedMigration {
            installed_rank: 1,
            version: MigrationVersion::parse(version).unwrap(),
            description: "test".to_string(),
            checksum: "abc".to_string(),
            applied_by: "postgres".to_string(),
            applied_at: Utc::now(),
            execution_time_ms: Some(5),
            success: true,
        }
    }

    fn pending(version: &str) -> PendingMigration {
        PendingMigration {
            version: MigrationVersion::parse(version).unwrap(),
            description: "test".to_string(),
            path: PathBuf::from(format!("V{version}__test.sql")),
            checksum: "abc".to_string(),
        }
    }

    #[test]
    fn test_counts_and_up_to_date() {
        let status = MigrationStatus::new(vec![applied("1")], Vec::new(), Vec::new());
        assert_eq!(status.applied_count, 1);
        assert_eq!(status.pending_count, 0);
        assert!(status.is_up_to_date());

        let status =
            MigrationStatus::new(vec![applied("1")], vec![pending("2")], Vec::new());
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_latest_and_next_versions() {
        let status = MigrationStatus::new(
            vec![applied("1"), applied("3")],
            vec![pending("4"), pending("5")],
            Vec::new(),
        );
        assert_eq!(status.latest_applied_version().unwrap().to_string(), "3");
        assert_eq!(status.next_pending_version().unwrap().to_string(), "4");
    }
}
