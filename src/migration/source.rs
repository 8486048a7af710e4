//! Migration source discovery and descriptor parsing
//!
//! Sources follow the `V<version>__<description>.sql` naming convention,
//! e.g. `V1__init.sql` or `V2.1__add_accounts.sql`. Discovery sits behind
//! the [`SourceProvider`] trait so the engine never cares where scripts
//! come from; [`DirectorySourceProvider`] is the shipped adapter.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::migration::checksum::calculate_checksum;
use crate::migration::{MigrationError, MigrationVersion};

// Pattern: V{version}__{description}.sql
static DESCRIPTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^V([0-9][0-9.]*)__(.+)\.sql$").expect("descriptor pattern"));

/// Statement fragments PostgreSQL refuses to run inside a transaction block.
const NON_TRANSACTIONAL: &[&str] = &[
    "CONCURRENTLY",
    "VACUUM",
    "ALTER SYSTEM",
    "CREATE DATABASE",
    "DROP DATABASE",
    "CREATE TABLESPACE",
    "DROP TABLESPACE",
];

/// A discovered migration source
///
/// Immutable once discovered; rebuilt from the configured locations on
/// every resolution pass.
#[derive(Debug, Clone)]
pub struct MigrationSource {
    /// Migration version parsed from the file name
    pub version: MigrationVersion,

    /// Human-readable description (file name with underscores folded to spaces)
    pub description: String,

    /// SHA-256 checksum of the file content
    pub checksum: String,

    /// The SQL script itself
    pub sql: String,

    /// Path the source was read from
    pub path: PathBuf,
}

impl MigrationSource {
    /// Parse a file name against the `V<version>__<description>.sql`
    /// convention.
    ///
    /// Returns `Ok(None)` for files that do not claim to be migrations
    /// (no `V` prefix or no `.sql` extension), so unrelated files can sit
    /// in a migrations directory.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidDescriptor` for a `V`-prefixed
    /// `.sql` file that does not match the convention, and
    /// `MigrationError::InvalidVersion` when the version text is malformed.
    pub fn parse_filename(
        filename: &str,
    ) -> Result<Option<(MigrationVersion, String)>, MigrationError> {
        if !filename.starts_with('V') || !filename.ends_with(".sql") {
            return Ok(None);
        }

        let caps = DESCRIPTOR_RE.captures(filename).ok_or_else(|| {
            MigrationError::InvalidDescriptor(format!(
                "'{}' does not match the expected pattern V<version>__<description>.sql",
                filename
            ))
        })?;

        let version: MigrationVersion = caps[1].parse()?;
        let description = caps[2].replace('_', " ");

        Ok(Some((version, description)))
    }

    /// Whether the script contains statements that cannot run inside a
    /// transaction block.
    ///
    /// Content scan, not a parser: a commented-out `VACUUM` also matches,
    /// which errs toward the non-atomic path.
    #[must_use]
    pub fn requires_non_transactional(&self) -> bool {
        let upper = self.sql.to_uppercase();
        NON_TRANSACTIONAL.iter().any(|kw| upper.contains(kw))
    }
}

/// Capability interface for migration discovery
///
/// Decouples the discovery mechanism from the engine: the engine only
/// ever asks a provider to enumerate its sources.
pub trait SourceProvider {
    /// Enumerate the provider's migration sources.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if sources cannot be enumerated or a
    /// descriptor cannot be parsed.
    fn list_sources(&self) -> Result<Vec<MigrationSource>, MigrationError>;
}

/// Discovers migration sources in a single directory
#[derive(Debug, Clone)]
pub struct DirectorySourceProvider {
    root: PathBuf,
}

impl DirectorySourceProvider {
    /// Create a provider rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SourceProvider for DirectorySourceProvider {
    fn list_sources(&self) -> Result<Vec<MigrationSource>, MigrationError> {
        if !self.root.is_dir() {
            return Err(MigrationError::InvalidDescriptor(format!(
                "migrations location is not a directory: {}",
                self.root.display()
            )));
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            MigrationError::InvalidDescriptor(format!(
                "failed to read migrations location {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut sources = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrationError::InvalidDescriptor(format!("failed to read directory entry: {e}"))
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let Some((version, description)) = MigrationSource::parse_filename(filename)? else {
                continue;
            };

            let sql = fs::read_to_string(&path).map_err(|e| {
                MigrationError::InvalidDescriptor(format!(
                    "failed to read migration file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let checksum = calculate_checksum(&sql);

            sources.push(MigrationSource {
                version,
                description,
                checksum,
                sql,
                path,
            });
        }

        sources.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(sources)
    }
}

/// Merge providers in order and enforce version uniqueness across the set.
///
/// # Errors
///
/// Returns `MigrationError::DuplicateVersion` when two sources (possibly
/// from different providers) resolve to the same version, and propagates
/// provider errors.
pub fn collect_sources(
    providers: &[Box<dyn SourceProvider>],
) -> Result<Vec<MigrationSource>, MigrationError> {
    let mut all = Vec::new();
    for provider in providers {
        all.extend(provider.list_sources()?);
    }

    all.sort_by(|a, b| a.version.cmp(&b.version));

    for pair in all.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(MigrationError::DuplicateVersion {
                version: pair[1].version.to_string(),
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filename_valid() {
        let (version, description) = MigrationSource::parse_filename("V1__init.sql")
            .unwrap()
            .unwrap();
        assert_eq!(version.to_string(), "1");
        assert_eq!(description, "init");

        let (version, description) =
            MigrationSource::parse_filename("V2.1__add_account_table.sql")
                .unwrap()
                .unwrap();
        assert_eq!(version.to_string(), "2.1");
        assert_eq!(description, "add account table");
    }

    #[test]
    fn test_parse_filename_skips_unrelated_files() {
        assert!(MigrationSource::parse_filename("README.md").unwrap().is_none());
        assert!(MigrationSource::parse_filename("notes.sql").unwrap().is_none());
        assert!(MigrationSource::parse_filename("V1__init.sql.bak")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_filename_rejects_malformed_descriptors() {
        // Claims to be a migration but misses the double underscore
        assert!(MigrationSource::parse_filename("V1_init.sql").is_err());
        // No description
        assert!(MigrationSource::parse_filename("V1__.sql").is_err());
        // Version is not numeric
        assert!(MigrationSource::parse_filename("Vx__init.sql").is_err());
    }

    #[test]
    fn test_non_transactional_detection() {
        let source = MigrationSource {
            version: MigrationVersion::parse("1").unwrap(),
            description: "add index".to_string(),
            checksum: String::new(),
            sql: "CREATE INDEX CONCURRENTLY idx_a ON t (a);".to_string(),
            path: PathBuf::from("V1__add_index.sql"),
        };
        assert!(source.requires_non_transactional());

        let source = MigrationSource {
            sql: "CREATE INDEX idx_a ON t (a);".to_string(),
            ..source
        };
        assert!(!source.requires_non_transactional());
    }
}
