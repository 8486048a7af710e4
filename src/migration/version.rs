//! Ordered migration version identifiers

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::migration::MigrationError;

/// A dotted numeric migration version such as `1`, `4.2`, or `20240120120000`.
///
/// Versions are totally ordered by numeric component. Absent trailing
/// components compare as zero, so `1.0` and `1` denote the same version;
/// equality and hashing follow that rule. The raw text is retained for
/// display.
#[derive(Debug, Clone)]
pub struct MigrationVersion {
    raw: String,
    parts: Vec<u64>,
}

impl MigrationVersion {
    /// Parse a version from its textual form.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` if the text is not a
    /// non-empty dot-separated sequence of decimal numbers.
    pub fn parse(raw: &str) -> Result<Self, MigrationError> {
        raw.parse()
    }

    /// The version text exactly as written in the source name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric components with trailing zeros trimmed, the canonical form
    /// used for equality and hashing.
    fn normalized(&self) -> &[u64] {
        let mut len = self.parts.len();
        while len > 0 && self.parts[len - 1] == 0 {
            len -= 1;
        }
        &self.parts[..len]
    }
}

impl FromStr for MigrationVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(MigrationError::InvalidVersion(s.to_string()));
        }

        let mut parts = Vec::new();
        for component in s.split('.') {
            // str::parse accepts a leading '+', which is not a valid version
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(MigrationError::InvalidVersion(s.to_string()));
            }
            let value = component
                .parse::<u64>()
                .map_err(|_| MigrationError::InvalidVersion(s.to_string()))?;
            parts.push(value);
        }

        Ok(Self {
            raw: s.to_string(),
            parts,
        })
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn v(s: &str) -> MigrationVersion {
        MigrationVersion::parse(s).unwrap()
    }

    #[test]
    fn test_ordering_is_numeric_not_lexical() {
        assert!(v("2") < v("10"));
        assert!(v("1.9") < v("1.10"));
        assert!(v("1") < v("1.1"));
        assert!(v("20240120120000") > v("9"));
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("1"), v("1.0"));
        assert_eq!(v("2.1"), v("2.1.0.0"));
        assert!(v("1.0.1") > v("1"));
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        let mut set = HashSet::new();
        set.insert(v("1.0"));
        assert!(set.contains(&v("1")));
        assert!(!set.contains(&v("1.1")));
    }

    #[test]
    fn test_parse_rejects_malformed_versions() {
        for bad in ["", "a", "1..2", "1.", ".1", "1.x", "+1", "1.-2", "1_000"] {
            assert!(
                MigrationVersion::parse(bad).is_err(),
                "should reject: {bad}"
            );
        }
    }

    #[test]
    fn test_display_keeps_raw_text() {
        assert_eq!(v("2.1.0").to_string(), "2.1.0");
    }
}
