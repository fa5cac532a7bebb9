//! Common types for the moderation crate.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of user-submitted content subject to review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Letter to a lost loved one
    Letter,
    /// Journal entry (moderated when published)
    JournalEntry,
    /// Community-submitted support resource
    ResourceSubmission,
    /// Review of an existing resource
    ResourceReview,
    /// Application to join the therapist directory
    TherapistApplication,
}

impl ContentType {
    /// All content types, in declaration order.
    pub const ALL: [ContentType; 5] = [
        ContentType::Letter,
        ContentType::JournalEntry,
        ContentType::ResourceSubmission,
        ContentType::ResourceReview,
        ContentType::TherapistApplication,
    ];

    /// Stable identifier used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Letter => "letter",
            ContentType::JournalEntry => "journal_entry",
            ContentType::ResourceSubmission => "resource_submission",
            ContentType::ResourceReview => "resource_review",
            ContentType::TherapistApplication => "therapist_application",
        }
    }

    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Letter => "letter",
            ContentType::JournalEntry => "journal entry",
            ContentType::ResourceSubmission => "resource submission",
            ContentType::ResourceReview => "resource review",
            ContentType::TherapistApplication => "therapist application",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a moderated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationStatus {
    /// Awaiting a decision (the safe default)
    #[default]
    Pending,
    /// Visible to the community
    Approved,
    /// Rejected by a moderator (or by policy for raw-decision content types)
    Rejected,
}

impl ModerationStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Decisions only leave `Pending`. Decided items may re-enter `Pending`
    /// through re-submission, never jump straight between decisions.
    pub fn can_transition_to(&self, next: ModerationStatus) -> bool {
        matches!(
            (self, next),
            (ModerationStatus::Pending, ModerationStatus::Approved)
                | (ModerationStatus::Pending, ModerationStatus::Rejected)
                | (ModerationStatus::Pending, ModerationStatus::Pending)
                | (ModerationStatus::Approved, ModerationStatus::Pending)
                | (ModerationStatus::Rejected, ModerationStatus::Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "PENDING",
            ModerationStatus::Approved => "APPROVED",
            ModerationStatus::Rejected => "REJECTED",
        }
    }
}

/// Decision returned by the evaluation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationDecision {
    Approve,
    Reject,
    /// Anything the model could not decide, or a decision we don't recognize
    Escalate,
}

impl ModerationDecision {
    /// Coerce free-form decision text. Unrecognized values escalate.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => ModerationDecision::Approve,
            "reject" | "rejected" => ModerationDecision::Reject,
            _ => ModerationDecision::Escalate,
        }
    }
}

/// Parsed and policy-checked result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResult {
    /// Decision reported by the evaluation service
    pub decision: ModerationDecision,
    /// Confidence in the decision (0.0 - 1.0)
    pub confidence: f64,
    /// Short explanation from the evaluation service
    pub reason: String,
    /// Computed locally, never taken from the model
    pub auto_approve: bool,
}

impl ModerationResult {
    /// Build a result and apply the auto-approval threshold.
    ///
    /// Callers validate `confidence` first; a value outside `[0, 1]` never
    /// auto-approves.
    pub fn new(
        decision: ModerationDecision,
        confidence: f64,
        reason: impl Into<String>,
        threshold: f64,
    ) -> Self {
        let in_range = (0.0..=1.0).contains(&confidence);
        Self {
            decision,
            confidence,
            reason: reason.into(),
            auto_approve: decision == ModerationDecision::Approve
                && in_range
                && confidence >= threshold,
        }
    }
}

/// What the engine hands back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// The service answered with a usable decision
    Assessed(ModerationResult),
    /// The service failed, timed out or answered garbage; item stays pending
    Degraded { reason: String },
}

impl EvaluationOutcome {
    /// The parsed result, if the evaluation succeeded.
    pub fn result(&self) -> Option<&ModerationResult> {
        match self {
            EvaluationOutcome::Assessed(result) => Some(result),
            EvaluationOutcome::Degraded { .. } => None,
        }
    }

    /// Whether this outcome allows skipping human review.
    pub fn auto_approve(&self) -> bool {
        self.result().map(|r| r.auto_approve).unwrap_or(false)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, EvaluationOutcome::Degraded { .. })
    }
}

/// A user-submitted item awaiting (or having received) a moderation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationCandidate {
    /// Record id
    pub id: Uuid,
    /// Submitting user
    pub author_id: Uuid,
    /// Which kind of content this is
    pub content_type: ContentType,
    /// Free-text fields (title, content, comment, bio, ...), sanitized HTML
    pub text_fields: BTreeMap<String, String>,
    /// Structured context (resource title, rating, loss type, ...)
    pub structured_fields: BTreeMap<String, serde_json::Value>,
    /// Current lifecycle state
    pub status: ModerationStatus,
    /// Result of the last successful evaluation
    pub ai_result: Option<ModerationResult>,
    /// Reason given by a moderator when rejecting
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationCandidate {
    /// Create a new pending candidate.
    pub fn new(author_id: Uuid, content_type: ContentType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id,
            content_type,
            text_fields: BTreeMap::new(),
            structured_fields: BTreeMap::new(),
            status: ModerationStatus::Pending,
            ai_result: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a free-text field.
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.text_fields.insert(key.into(), value.into());
        self
    }

    /// Add a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.structured_fields.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or_default(),
        );
        self
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.text_fields.get(key).map(String::as_str)
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.structured_fields.get(key).and_then(|v| v.as_str())
    }
}
