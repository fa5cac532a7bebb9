//! Per-content-type transition policy.
//!
//! Content types differ in how an evaluation is applied:
//!
//! | Content type            | Gate                          |
//! |-------------------------|-------------------------------|
//! | letter                  | auto-approve                  |
//! | resource submission     | auto-approve                  |
//! | resource review         | auto-approve                  |
//! | journal entry           | raw decision                  |
//! | therapist application   | raw decision                  |
//!
//! An auto-approve gate never rejects: anything short of an auto-approval
//! stays pending for a human. A raw-decision gate follows the decision
//! directly, with ESCALATE staying pending.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ModerationConfig;
use crate::types::{ContentType, EvaluationOutcome, ModerationDecision, ModerationStatus};

/// How evaluation results are applied for one content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPolicy {
    /// Gate on `auto_approve` (true) or on the raw decision (false)
    pub uses_auto_approve_gate: bool,
}

impl ContentPolicy {
    pub const AUTO_APPROVE_GATE: ContentPolicy = ContentPolicy {
        uses_auto_approve_gate: true,
    };

    pub const RAW_DECISION: ContentPolicy = ContentPolicy {
        uses_auto_approve_gate: false,
    };

    /// Status an item should move to after this outcome.
    pub fn transition(&self, outcome: &EvaluationOutcome) -> ModerationStatus {
        let Some(result) = outcome.result() else {
            return ModerationStatus::Pending;
        };

        if self.uses_auto_approve_gate {
            return if result.auto_approve {
                ModerationStatus::Approved
            } else {
                ModerationStatus::Pending
            };
        }

        match result.decision {
            ModerationDecision::Approve => ModerationStatus::Approved,
            ModerationDecision::Reject => ModerationStatus::Rejected,
            ModerationDecision::Escalate => ModerationStatus::Pending,
        }
    }
}

/// Strategy table keyed by content type.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<ContentType, ContentPolicy>,
}

impl PolicyTable {
    /// The observed defaults.
    pub fn defaults() -> Self {
        let policies = ContentType::ALL
            .into_iter()
            .map(|ty| (ty, Self::default_policy(ty)))
            .collect();
        Self { policies }
    }

    /// Defaults plus any configured overrides.
    pub fn from_config(config: &ModerationConfig) -> Self {
        let mut table = Self::defaults();
        for (ty, policy) in &config.policy_overrides {
            table.set(*ty, *policy);
        }
        table
    }

    fn default_policy(content_type: ContentType) -> ContentPolicy {
        match content_type {
            ContentType::Letter
            | ContentType::ResourceSubmission
            | ContentType::ResourceReview => ContentPolicy::AUTO_APPROVE_GATE,
            ContentType::JournalEntry | ContentType::TherapistApplication => {
                ContentPolicy::RAW_DECISION
            }
        }
    }

    /// Replace the policy for one content type.
    pub fn set(&mut self, content_type: ContentType, policy: ContentPolicy) {
        self.policies.insert(content_type, policy);
    }

    pub fn policy(&self, content_type: ContentType) -> ContentPolicy {
        self.policies
            .get(&content_type)
            .copied()
            .unwrap_or(ContentPolicy::AUTO_APPROVE_GATE)
    }

    /// Status an item of `content_type` should move to after `outcome`.
    pub fn transition(
        &self,
        content_type: ContentType,
        outcome: &EvaluationOutcome,
    ) -> ModerationStatus {
        self.policy(content_type).transition(outcome)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModerationResult;

    fn assessed(decision: ModerationDecision, confidence: f64) -> EvaluationOutcome {
        EvaluationOutcome::Assessed(ModerationResult::new(decision, confidence, "", 0.9))
    }

    #[test]
    fn test_gated_types_never_auto_reject() {
        let table = PolicyTable::defaults();

        for ty in [
            ContentType::Letter,
            ContentType::ResourceSubmission,
            ContentType::ResourceReview,
        ] {
            assert_eq!(
                table.transition(ty, &assessed(ModerationDecision::Approve, 0.95)),
                ModerationStatus::Approved
            );
            assert_eq!(
                table.transition(ty, &assessed(ModerationDecision::Approve, 0.6)),
                ModerationStatus::Pending
            );
            assert_eq!(
                table.transition(ty, &assessed(ModerationDecision::Reject, 0.99)),
                ModerationStatus::Pending
            );
        }
    }

    #[test]
    fn test_raw_decision_types_follow_decision() {
        let table = PolicyTable::defaults();

        for ty in [ContentType::JournalEntry, ContentType::TherapistApplication] {
            assert_eq!(
                table.transition(ty, &assessed(ModerationDecision::Approve, 0.5)),
                ModerationStatus::Approved
            );
            assert_eq!(
                table.transition(ty, &assessed(ModerationDecision::Reject, 0.5)),
                ModerationStatus::Rejected
            );
            assert_eq!(
                table.transition(ty, &assessed(ModerationDecision::Escalate, 0.99)),
                ModerationStatus::Pending
            );
        }
    }

    #[test]
    fn test_degraded_is_pending_everywhere() {
        let table = PolicyTable::defaults();
        let degraded = EvaluationOutcome::Degraded {
            reason: "timeout".to_string(),
        };

        for ty in ContentType::ALL {
            assert_eq!(table.transition(ty, &degraded), ModerationStatus::Pending);
        }
    }

    #[test]
    fn test_overrides_from_config() {
        let mut config = ModerationConfig::default();
        config
            .policy_overrides
            .insert(ContentType::JournalEntry, ContentPolicy::AUTO_APPROVE_GATE);

        let table = PolicyTable::from_config(&config);
        assert!(table.policy(ContentType::JournalEntry).uses_auto_approve_gate);
        assert_eq!(
            table.transition(
                ContentType::JournalEntry,
                &assessed(ModerationDecision::Reject, 0.99)
            ),
            ModerationStatus::Pending
        );
    }
}
