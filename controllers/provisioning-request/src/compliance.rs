//! Compliance aggregation.
//!
//! Reduces the policies bound to a cluster into the ConfigurationApplied
//! verdict and tracks when the cluster first fell out of compliance with
//! an enforce policy.

use crate::timeouts::is_timed_out;
use chrono::{DateTime, Utc};
use crds::{ConditionReason, ConditionStatus, PolicyDetails};
use provisioning_backend::{ComplianceState, PolicyRecord, RemediationAction};
use std::time::Duration;

pub const CLUSTER_NOT_READY_MESSAGE: &str = "The Cluster is not yet ready";
pub const MISSING_MESSAGE: &str = "No configuration present";
pub const IN_PROGRESS_MESSAGE: &str = "The configuration is still being applied";
pub const TIMED_OUT_MESSAGE: &str = "The configuration is still being applied, but it timed out";
pub const OUT_OF_DATE_MESSAGE: &str = "The configuration is out of date";
pub const COMPLETED_MESSAGE: &str = "The configuration is up to date";

/// What the cluster looks like from the policy engine
#[derive(Debug, Clone, Copy)]
pub struct ComplianceInput<'a> {
    pub records: &'a [PolicyRecord],
    pub cluster_ready: bool,
    /// Previously recorded start of enforce non-compliance
    pub non_compliant_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub timeout: Duration,
}

/// Aggregated verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceOutcome {
    pub status: ConditionStatus,
    pub reason: ConditionReason,
    pub message: &'static str,
    pub non_compliant_at: Option<DateTime<Utc>>,
    /// Sorted snapshot replacing the previous one
    pub policies: Vec<PolicyDetails>,
    /// Policies are still converging and should be checked again
    pub requeue: bool,
}

impl ComplianceOutcome {
    pub fn is_completed(&self) -> bool {
        self.reason == ConditionReason::Completed
    }
}

/// Computes the ConfigurationApplied verdict.
///
/// An enforce policy that has not reported yet counts as pending.
pub fn aggregate(input: &ComplianceInput<'_>) -> ComplianceOutcome {
    let policies = snapshot(input.records);

    let outcome = |status, reason, message, non_compliant_at, requeue| ComplianceOutcome {
        status,
        reason,
        message,
        non_compliant_at,
        policies: policies.clone(),
        requeue,
    };

    if !input.cluster_ready {
        return outcome(
            ConditionStatus::False,
            ConditionReason::ClusterNotReady,
            CLUSTER_NOT_READY_MESSAGE,
            input.non_compliant_at,
            true,
        );
    }

    if input.records.is_empty() {
        return outcome(ConditionStatus::False, ConditionReason::Missing, MISSING_MESSAGE, None, false);
    }

    let enforce_converging = input.records.iter().any(|r| {
        r.remediation_action == RemediationAction::Enforce && r.compliance_state != ComplianceState::Compliant
    });
    if enforce_converging {
        let since = input.non_compliant_at.unwrap_or(input.now);
        return if is_timed_out(since, input.now, input.timeout) {
            outcome(ConditionStatus::False, ConditionReason::TimedOut, TIMED_OUT_MESSAGE, Some(since), false)
        } else {
            outcome(ConditionStatus::False, ConditionReason::InProgress, IN_PROGRESS_MESSAGE, Some(since), true)
        };
    }

    let inform_non_compliant = input.records.iter().any(|r| {
        r.remediation_action == RemediationAction::Inform && r.compliance_state == ComplianceState::NonCompliant
    });
    if inform_non_compliant {
        return outcome(ConditionStatus::False, ConditionReason::OutOfDate, OUT_OF_DATE_MESSAGE, None, false);
    }

    outcome(ConditionStatus::True, ConditionReason::Completed, COMPLETED_MESSAGE, None, false)
}

/// Converts child policy records into the persisted snapshot.
///
/// Child policies are named `<parentNamespace>.<parentName>`; the snapshot
/// records the parent.
pub fn snapshot(records: &[PolicyRecord]) -> Vec<PolicyDetails> {
    let mut policies: Vec<PolicyDetails> = records
        .iter()
        .map(|record| {
            let (policy_namespace, policy_name) = match record.name.split_once('.') {
                Some((namespace, name)) => (namespace.to_string(), name.to_string()),
                None => (record.namespace.clone(), record.name.clone()),
            };
            PolicyDetails {
                policy_name,
                policy_namespace,
                remediation_action: record.remediation_action.as_str().to_string(),
                compliant: record.compliance_state.as_str().to_string(),
            }
        })
        .collect();
    policies.sort();
    policies
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(name: &str, action: RemediationAction, state: ComplianceState) -> PolicyRecord {
        PolicyRecord {
            name: format!("ztp-sno.{name}"),
            namespace: "site-1".to_string(),
            remediation_action: action,
            compliance_state: state,
        }
    }

    fn input<'a>(records: &'a [PolicyRecord], non_compliant_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ComplianceInput<'a> {
        ComplianceInput {
            records,
            cluster_ready: true,
            non_compliant_at,
            now,
            timeout: Duration::from_secs(30 * 60),
        }
    }

    #[test]
    fn test_zero_records_is_missing() {
        let out = aggregate(&input(&[], Some(now()), now()));
        assert_eq!(out.reason, ConditionReason::Missing);
        assert_eq!(out.message, MISSING_MESSAGE);
        assert_eq!(out.non_compliant_at, None);
    }

    #[test]
    fn test_all_compliant_completes_and_clears_timestamp() {
        let records = [
            record("v1-sriov-policy", RemediationAction::Enforce, ComplianceState::Compliant),
            record("v1-subscriptions-policy", RemediationAction::Inform, ComplianceState::Compliant),
        ];
        let out = aggregate(&input(&records, Some(now()), now()));
        assert_eq!(out.status, ConditionStatus::True);
        assert!(out.is_completed());
        assert_eq!(out.non_compliant_at, None);
        assert!(!out.requeue);
    }

    #[test]
    fn test_enforce_non_compliant_sets_timestamp_once() {
        let records = [record("v1-sriov-policy", RemediationAction::Enforce, ComplianceState::NonCompliant)];
        let first = aggregate(&input(&records, None, now()));
        assert_eq!(first.reason, ConditionReason::InProgress);
        assert_eq!(first.non_compliant_at, Some(now()));
        assert!(first.requeue);

        let later = now() + chrono::Duration::minutes(10);
        let second = aggregate(&input(&records, first.non_compliant_at, later));
        assert_eq!(second.reason, ConditionReason::InProgress);
        assert_eq!(second.non_compliant_at, Some(now()));
    }

    #[test]
    fn test_enforce_timeout_keeps_timestamp() {
        let records = [record("v1-sriov-policy", RemediationAction::Enforce, ComplianceState::Pending)];
        let later = now() + chrono::Duration::minutes(31);
        let out = aggregate(&input(&records, Some(now()), later));
        assert_eq!(out.reason, ConditionReason::TimedOut);
        assert_eq!(out.message, TIMED_OUT_MESSAGE);
        assert_eq!(out.non_compliant_at, Some(now()));
        assert!(!out.requeue);
    }

    #[test]
    fn test_inform_non_compliance_is_out_of_date_and_clears_timestamp() {
        let records = [
            record("v1-sriov-policy", RemediationAction::Enforce, ComplianceState::Compliant),
            record("v1-perf-policy", RemediationAction::Inform, ComplianceState::NonCompliant),
        ];
        let out = aggregate(&input(&records, Some(now()), now()));
        assert_eq!(out.reason, ConditionReason::OutOfDate);
        assert_eq!(out.non_compliant_at, None);
    }

    #[test]
    fn test_cluster_not_ready_ignores_policies() {
        let records = [record("v1-sriov-policy", RemediationAction::Enforce, ComplianceState::Compliant)];
        let mut not_ready = input(&records, None, now());
        not_ready.cluster_ready = false;
        let out = aggregate(&not_ready);
        assert_eq!(out.reason, ConditionReason::ClusterNotReady);
        assert_eq!(out.message, CLUSTER_NOT_READY_MESSAGE);
        assert_eq!(out.policies.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted_and_uses_parent_names() {
        let records = [
            record("v1-sriov-policy", RemediationAction::Enforce, ComplianceState::Compliant),
            record("v1-perf-policy", RemediationAction::Inform, ComplianceState::Unset),
        ];
        let snapshot = snapshot(&records);
        assert_eq!(snapshot[0].policy_name, "v1-perf-policy");
        assert_eq!(snapshot[0].policy_namespace, "ztp-sno");
        assert_eq!(snapshot[0].compliant, "");
        assert_eq!(snapshot[1].remediation_action, "enforce");
    }
}
