//! Condition ledger.
//!
//! Holds the ordered stage conditions of one ProvisioningRequest while a
//! reconciliation runs. Entries are updated in place or appended, never
//! removed or reordered, and `lastTransitionTime` only moves when the
//! status or reason of an entry changes.

use chrono::{DateTime, Utc};
use crds::{Condition, ConditionReason, ConditionStatus, ConditionType};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionLedger {
    conditions: Vec<Condition>,
}

impl ConditionLedger {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_.as_str())
    }

    pub fn is_present(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some()
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    pub fn has_reason(&self, type_: ConditionType, reason: ConditionReason) -> bool {
        self.get(type_).is_some_and(|c| c.has_reason(reason))
    }

    /// True when the condition carries a terminal TimedOut or Failed reason
    pub fn is_timed_out_or_failed(&self, type_: ConditionType) -> bool {
        self.has_reason(type_, ConditionReason::TimedOut) || self.has_reason(type_, ConditionReason::Failed)
    }

    /// Records a stage verdict. Returns true if the ledger changed.
    pub fn set(
        &mut self,
        type_: ConditionType,
        reason: ConditionReason,
        status: ConditionStatus,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        self.upsert(type_, reason.as_str(), status, message.into(), now)
    }

    /// Copies status, reason and message from a collaborator condition.
    pub fn mirror(&mut self, type_: ConditionType, source: &Condition, now: DateTime<Utc>) -> bool {
        self.upsert(type_, &source.reason, source.status, source.message.clone(), now)
    }

    fn upsert(
        &mut self,
        type_: ConditionType,
        reason: &str,
        status: ConditionStatus,
        message: String,
        now: DateTime<Utc>,
    ) -> bool {
        match self.conditions.iter_mut().find(|c| c.type_ == type_.as_str()) {
            Some(existing) => {
                if existing.status == status && existing.reason == reason && existing.message == message {
                    return false;
                }
                if existing.status != status || existing.reason != reason {
                    existing.last_transition_time = Some(now);
                }
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message;
                true
            }
            None => {
                self.conditions.push(Condition {
                    type_: type_.as_str().to_string(),
                    status,
                    reason: reason.to_string(),
                    message,
                    last_transition_time: Some(now),
                });
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn into_inner(self) -> Vec<Condition> {
        self.conditions
    }
}
