//! Execution report and run outcome

use serde::Serialize;

use crate::migration::{Anomaly, MigrationVersion};

/// Overall result of a migration run, mapped to a process exit code by
/// the invoking collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// All pending migrations applied (or nothing was pending)
    Success,
    /// Anomalies found during resolution; nothing was applied
    ValidationFailure,
    /// The run halted on a failed migration; earlier ones may be applied
    PartialFailure,
}

/// What a migration run did
#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    /// Overall result
    pub outcome: RunOutcome,

    /// Versions applied, in application order
    pub applied_versions: Vec<MigrationVersion>,

    /// The first version that failed, if any
    pub failed_version: Option<MigrationVersion>,

    /// Cause of the first failure, if any
    pub failure_cause: Option<String>,

    /// Anomalies found during resolution
    pub anomalies: Vec<Anomaly>,

    /// Non-fatal findings (e.g. non-transactional scripts)
    pub warnings: Vec<String>,

    /// Wall-clock time of the apply phase
    pub total_execution_time_ms: i64,
}

impl ExecutionReport {
    /// Report for a run that was aborted by resolution anomalies
    #[must_use]
    pub fn validation_failure(anomalies: Vec<Anomaly>) -> Self {
        Self {
            outcome: RunOutcome::ValidationFailure,
            applied_versions: Vec::new(),
            failed_version: None,
            failure_cause: None,
            anomalies,
            warnings: Vec::new(),
            total_execution_time_ms: 0,
        }
    }

    /// Report for a run that found nothing pending
    #[must_use]
    pub fn up_to_date() -> Self {
        Self {
            outcome: RunOutcome::Success,
            applied_versions: Vec::new(),
            failed_version: None,
            failure_cause: None,
            anomalies: Vec::new(),
            warnings: Vec::new(),
            total_execution_time_ms: 0,
        }
    }

    /// Serialize the report as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_to_date_report_is_success() {
        let report = ExecutionReport::up_to_date();
        assert_eq!(report.outcome, RunOutcome::Success);
        assert!(report.applied_versions.is_empty());
        assert!(report.failed_version.is_none());
    }

    #[test]
    fn test_validation_failure_report_applies_nothing() {
        let report = ExecutionReport::validation_failure(Vec::new());
        assert_eq!(report.outcome, RunOutcome::ValidationFailure);
        assert!(report.applied_versions.is_empty());
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = ExecutionReport::up_to_date();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"outcome\": \"success\""));
        assert!(json.contains("applied_versions"));
    }
}
