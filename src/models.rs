use crate::catalog::Diagnostic;
use crate::checks::{CheckError, CheckOutcome};
use crate::cluster::{HostIdentity, MemberSummary};
use crate::entities::Entity;
use serde::Serialize;

/// Outcome class of one diagnostic in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every host that should have answered did.
    Ok,
    /// Findings are partial: some hosts failed.
    Degraded,
    /// No host answered; there are no findings to report.
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Ok => "OK",
            ReportStatus::Degraded => "DEGRADED",
            ReportStatus::Failed => "FAILED",
        }
    }
}

/// Result of one diagnostic, detached from its entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub diagnostic: Diagnostic,
    pub description: String,
    pub status: ReportStatus,
    pub findings: Vec<String>,
    pub queried_hosts: Vec<HostIdentity>,
    pub failed_hosts: Vec<HostIdentity>,
    /// False when a replica stood in for a missing primary.
    pub answered_by_primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiagnosticReport {
    pub fn from_outcome<T: Entity>(outcome: &CheckOutcome<T>) -> Self {
        let status = if outcome.is_degraded() {
            ReportStatus::Degraded
        } else {
            ReportStatus::Ok
        };
        Self {
            diagnostic: outcome.diagnostic,
            description: outcome.diagnostic.description().to_string(),
            status,
            findings: outcome.findings.iter().map(|f| f.to_string()).collect(),
            queried_hosts: outcome.queried_hosts.clone(),
            failed_hosts: outcome.failed_hosts.clone(),
            answered_by_primary: outcome.answered_by_primary,
            error: None,
        }
    }

    pub fn failed(diagnostic: Diagnostic, err: &CheckError) -> Self {
        let failed_hosts = match err {
            CheckError::AllHostsFailed { failures, .. } => {
                failures.iter().map(|f| f.host().clone()).collect()
            }
        };
        Self {
            diagnostic,
            description: diagnostic.description().to_string(),
            status: ReportStatus::Failed,
            findings: Vec::new(),
            queried_hosts: Vec::new(),
            failed_hosts,
            answered_by_primary: false,
            error: Some(err.to_string()),
        }
    }

    pub fn count(&self) -> usize {
        self.findings.len()
    }

    /// `<diagnostic>:<count>`, or `<diagnostic>:failed` when no host answered.
    pub fn log_line(&self) -> String {
        match self.status {
            ReportStatus::Failed => format!("{}:failed", self.diagnostic.name()),
            _ => format!("{}:{}", self.diagnostic.name(), self.count()),
        }
    }
}

/// Everything one batch learned about one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub schema: String,
    /// No reachable member was primary, so no answer comes from the primary.
    pub replica_only: bool,
    pub members: Vec<MemberSummary>,
    pub reports: Vec<DiagnosticReport>,
}

impl HealthReport {
    pub fn log_lines(&self) -> Vec<String> {
        self.reports.iter().map(DiagnosticReport::log_line).collect()
    }

    pub fn total_findings(&self) -> usize {
        self.reports.iter().map(DiagnosticReport::count).sum()
    }

    pub fn count_by_status(&self, status: ReportStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::HostError;
    use crate::entities::Table;
    use std::time::Duration;

    fn outcome(failed: &[&str]) -> CheckOutcome<Table> {
        CheckOutcome {
            diagnostic: Diagnostic::TablesWithoutPrimaryKey,
            findings: vec![Table::new("t1", 8192).unwrap()],
            queried_hosts: vec![HostIdentity::new("p", 5432)],
            failed_hosts: failed.iter().map(|h| HostIdentity::new(*h, 5432)).collect(),
            answered_by_primary: true,
        }
    }

    #[test]
    fn report_from_healthy_outcome() {
        let report = DiagnosticReport::from_outcome(&outcome(&[]));
        assert_eq!(report.status, ReportStatus::Ok);
        assert_eq!(report.findings, vec!["t1 (8192 bytes)"]);
        assert_eq!(report.log_line(), "tables_without_primary_key:1");
        assert!(report.answered_by_primary);
    }

    #[test]
    fn replica_answer_is_carried_into_report() {
        let mut replica_answer = outcome(&[]);
        replica_answer.answered_by_primary = false;
        let report = DiagnosticReport::from_outcome(&replica_answer);
        assert_eq!(report.status, ReportStatus::Ok);
        assert!(!report.answered_by_primary);
    }

    #[test]
    fn report_from_partial_outcome_is_degraded() {
        let report = DiagnosticReport::from_outcome(&outcome(&["r1"]));
        assert_eq!(report.status, ReportStatus::Degraded);
        assert_eq!(report.failed_hosts, vec![HostIdentity::new("r1", 5432)]);
    }

    #[test]
    fn failed_report_is_distinct_from_empty() {
        let err = CheckError::AllHostsFailed {
            diagnostic: Diagnostic::UnusedIndexes,
            failures: vec![HostError::Timeout {
                host: HostIdentity::new("p", 5432),
                diagnostic: Diagnostic::UnusedIndexes,
                after: Duration::from_secs(1),
            }],
        };
        let report = DiagnosticReport::failed(Diagnostic::UnusedIndexes, &err);
        assert_eq!(report.log_line(), "unused_indexes:failed");
        assert_eq!(report.failed_hosts, vec![HostIdentity::new("p", 5432)]);
        assert!(report.error.is_some());
    }
}
