//! Audit trail for moderation evaluations.
//!
//! Every call to the engine produces one entry, assessed or degraded.
//! Submission text is never retained; entries carry a SHA-256 digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{ContentType, EvaluationOutcome, ModerationDecision};

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Hex SHA-256 of some text.
pub fn content_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    /// Candidate that was evaluated
    pub candidate_id: Uuid,
    pub content_type: ContentType,
    /// SHA-256 of the evaluated plain text
    pub content_digest: String,
    /// Backend that answered (model id)
    pub backend_id: String,
    /// What the engine returned
    pub outcome: EvaluationOutcome,
    /// Wall time of the evaluation
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        candidate_id: Uuid,
        content_type: ContentType,
        content_digest: impl Into<String>,
        backend_id: impl Into<String>,
        outcome: EvaluationOutcome,
        duration_ms: u64,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            candidate_id,
            content_type,
            content_digest: content_digest.into(),
            backend_id: backend_id.into(),
            outcome,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }
}

/// Audit log for moderation evaluations.
pub struct ModerationAudit {
    /// Log entries (newest first)
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    /// Maximum entries to retain
    max_entries: usize,
}

impl ModerationAudit {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Append an entry, pruning the oldest if over the limit.
    pub async fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// All entries for one candidate, newest first.
    pub async fn for_candidate(&self, candidate_id: Uuid) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.candidate_id == candidate_id)
            .cloned()
            .collect()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let mut stats = AuditStats {
            total: entries.len(),
            ..Default::default()
        };
        let mut total_duration = 0u64;

        for entry in entries.iter() {
            total_duration += entry.duration_ms;
            match &entry.outcome {
                EvaluationOutcome::Degraded { .. } => stats.degraded += 1,
                EvaluationOutcome::Assessed(result) => {
                    stats.assessed += 1;
                    if result.auto_approve {
                        stats.auto_approved += 1;
                    }
                    match result.decision {
                        ModerationDecision::Approve => stats.approve += 1,
                        ModerationDecision::Reject => stats.reject += 1,
                        ModerationDecision::Escalate => stats.escalate += 1,
                    }
                }
            }
        }

        if stats.total > 0 {
            stats.avg_duration_ms = total_duration / stats.total as u64;
        }

        stats
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for ModerationAudit {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Total evaluations logged
    pub total: usize,
    /// Evaluations with a usable answer
    pub assessed: usize,
    /// Evaluations that failed closed
    pub degraded: usize,
    /// Assessed and cleared the threshold
    pub auto_approved: usize,
    pub approve: usize,
    pub reject: usize,
    pub escalate: usize,
    /// Average evaluation duration
    pub avg_duration_ms: u64,
}
