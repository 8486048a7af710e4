//! Checksum calculation for migration sources

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of migration content.
///
/// The hex digest is recorded in the history table at apply time and
/// compared against the on-disk content on every resolution pass, so any
/// edit to an already-applied migration shows up as drift.
#[must_use]
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
