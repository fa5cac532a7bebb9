//! Moderation - AI-assisted content decisions
//!
//! Turns free-text community submissions (letters, journal entries,
//! resources, reviews, therapist applications) into a moderation outcome:
//! - Trait-based LLM backends (OpenAI-compatible, mock)
//! - Markup sanitization before storage and before evaluation
//! - A conservative auto-approval policy computed locally
//! - Per-content-type transition policy
//! - An audit trail of every evaluation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            ModerationEngine              │
//! │  sanitize → prompt → backend → parse     │
//! └────────────────┬─────────────────────────┘
//!                  │ EvaluationOutcome
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ PolicyTable │       │ Moderation  │
//! │ (status)    │       │ Audit       │
//! └─────────────┘       └─────────────┘
//! ```
//!
//! The engine never persists anything. Callers apply the returned outcome
//! through [`PolicyTable::transition`] and store the result themselves.

pub mod audit;
pub mod backend;
pub mod config;
pub mod engine;
pub mod policy;
pub mod prompt;
pub mod sanitize;
pub mod types;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditStats, ModerationAudit};
pub use backend::traits::{ChatTurn, CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use config::ModerationConfig;
pub use engine::{ModerationEngine, ModerationError};
pub use policy::{ContentPolicy, PolicyTable};
pub use sanitize::{sanitize_html, to_plain_text};
pub use types::*;
