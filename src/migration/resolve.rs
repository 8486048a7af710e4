//! Resolution engine
//!
//! Read-only comparison of discovered sources against recorded history.
//! Produces the ordered pending set and the list of anomalies; any hard
//! anomaly empties the pending set, so resolution failures always abort
//! before mutation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::info;
use serde::Serialize;

use crate::migration::{AppliedMigration, MigrationError, MigrationSource, MigrationVersion};

/// Classification of a discovered or recorded version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationState {
    /// Discovered, not yet applied
    Pending,
    /// Applied with a matching checksum
    Applied,
    /// Applied, but the on-disk content has changed
    ChecksumMismatch,
    /// Applied, but no source on disk claims the version
    MissingFromDisk,
    /// Pending below the highest applied version
    OutOfOrder,
    /// A recorded attempt that never succeeded
    FailedAttempt,
}

/// What, precisely, is wrong with a version
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AnomalyKind {
    ChecksumMismatch {
        stored: String,
        current: String,
    },
    MissingFromDisk,
    OutOfOrder {
        highest_applied: MigrationVersion,
    },
    FailedAttempt,
    DuplicateVersion,
}

/// A classified resolution issue
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub version: MigrationVersion,
    pub description: String,
    #[serde(flatten)]
    pub kind: AnomalyKind,
}

impl Anomaly {
    /// The state classification this anomaly corresponds to
    #[must_use]
    pub fn state(&self) -> MigrationState {
        match self.kind {
            AnomalyKind::ChecksumMismatch { .. } => MigrationState::ChecksumMismatch,
            AnomalyKind::MissingFromDisk => MigrationState::MissingFromDisk,
            AnomalyKind::OutOfOrder { .. } => MigrationState::OutOfOrder,
            AnomalyKind::FailedAttempt => MigrationState::FailedAttempt,
            // A duplicate has no state of its own; it invalidates the set
            AnomalyKind::DuplicateVersion => MigrationState::Pending,
        }
    }

    /// Convert the anomaly into the matching error
    #[must_use]
    pub fn to_error(&self) -> MigrationError {
        match &self.kind {
            AnomalyKind::ChecksumMismatch { stored, current } => {
                MigrationError::ChecksumMismatch {
                    version: self.version.to_string(),
                    description: self.description.clone(),
                    stored: stored.clone(),
                    current: current.clone(),
                }
            }
            AnomalyKind::MissingFromDisk => MigrationError::MissingFile {
                version: self.version.to_string(),
                description: self.description.clone(),
            },
            AnomalyKind::OutOfOrder { highest_applied } => MigrationError::OutOfOrder {
                version: self.version.to_string(),
                highest_applied: highest_applied.to_string(),
            },
            AnomalyKind::FailedAttempt => MigrationError::FailedAttempt {
                version: self.version.to_string(),
                description: self.description.clone(),
            },
            AnomalyKind::DuplicateVersion => MigrationError::InvalidDescriptor(format!(
                "duplicate migration version {} in the discovered set",
                self.version
            )),
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Mirror the matching error text so logs and reports agree
        write!(f, "{}", self.to_error())
    }
}

/// Controls which resolution findings are accepted rather than flagged
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionPolicy {
    /// Accept pending versions below the highest applied version
    pub out_of_order: bool,
}

/// The outcome of a resolution pass
#[derive(Debug)]
pub struct Resolution {
    /// Versions to apply, ascending; empty when anything is anomalous
    pub pending: Vec<MigrationSource>,
    /// Everything that prevented (or would prevent) a clean run
    pub anomalies: Vec<Anomaly>,
}

impl Resolution {
    /// Whether the pass found no anomalies
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Fail with the first anomaly, if any
    ///
    /// # Errors
    ///
    /// Returns the error form of the first anomaly.
    pub fn ensure_clean(&self) -> Result<(), MigrationError> {
        match self.anomalies.first() {
            Some(anomaly) => Err(anomaly.to_error()),
            None => Ok(()),
        }
    }
}

/// Resolve discovered sources against recorded history.
///
/// Sorts `discovered` ascending, re-validates version uniqueness
/// defensively (the parser already enforces it), and classifies every
/// version per [`MigrationState`]. Checksums compare against the latest
/// successful history row per version; a mismatch is always a hard
/// anomaly. Out-of-order pending versions are anomalies unless the
/// policy accepts them.
#[must_use]
pub fn resolve(
    mut discovered: Vec<MigrationSource>,
    history: &[AppliedMigration],
    policy: &ResolutionPolicy,
) -> Resolution {
    discovered.sort_by(|a, b| a.version.cmp(&b.version));

    let mut anomalies = Vec::new();

    for pair in discovered.windows(2) {
        if pair[0].version == pair[1].version {
            anomalies.push(Anomaly {
                version: pair[1].version.clone(),
                description: pair[1].description.clone(),
                kind: AnomalyKind::DuplicateVersion,
            });
        }
    }

    // Latest successful row per version wins the checksum comparison
    let mut succeeded: HashMap<MigrationVersion, &AppliedMigration> = HashMap::new();
    for row in history {
        if row.success {
            succeeded.insert(row.version.clone(), row);
        }
    }

    // Failed attempts with no later success are crash/abort residue
    let mut flagged_failures: HashSet<MigrationVersion> = HashSet::new();
    for row in history {
        if !row.success
            && !succeeded.contains_key(&row.version)
            && flagged_failures.insert(row.version.clone())
        {
            anomalies.push(Anomaly {
                version: row.version.clone(),
                description: row.description.clone(),
                kind: AnomalyKind::FailedAttempt,
            });
        }
    }

    let highest_applied: Option<MigrationVersion> = succeeded.keys().max().cloned();

    let discovered_versions: HashSet<MigrationVersion> =
        discovered.iter().map(|s| s.version.clone()).collect();

    let mut pending = Vec::new();

    for source in discovered {
        match succeeded.get(&source.version) {
            Some(row) => {
                if row.checksum != source.checksum {
                    anomalies.push(Anomaly {
                        version: source.version.clone(),
                        description: source.description.clone(),
                        kind: AnomalyKind::ChecksumMismatch {
                            stored: row.checksum.clone(),
                            current: source.checksum.clone(),
                        },
                    });
                }
            }
            None => {
                let behind = highest_applied
                    .as_ref()
                    .filter(|highest| source.version < **highest);
                match behind {
                    Some(highest) if !policy.out_of_order => {
                        anomalies.push(Anomaly {
                            version: source.version.clone(),
                            description: source.description.clone(),
                            kind: AnomalyKind::OutOfOrder {
                                highest_applied: highest.clone(),
                            },
                        });
                    }
                    Some(_) => {
                        info!(
                            "accepting out-of-order migration {} ({}) by policy",
                            source.version, source.description
                        );
                        pending.push(source);
                    }
                    None => pending.push(source),
                }
            }
        }
    }

    for (version, row) in &succeeded {
        if !discovered_versions.contains(version) {
            anomalies.push(Anomaly {
                version: version.clone(),
                description: row.description.clone(),
                kind: AnomalyKind::MissingFromDisk,
            });
        }
    }

    // Deterministic output regardless of map iteration order
    anomalies.sort_by(|a, b| a.version.cmp(&b.version));

    // Resolution-phase failures abort before any mutation
    if !anomalies.is_empty() {
        pending.clear();
    }

    Resolution { pending, anomalies }
}
