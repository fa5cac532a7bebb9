//! Error taxonomy surfaced to callers of the community services.
//!
//! Evaluation-service failures never appear here: the moderation engine
//! absorbs them into a degraded outcome and the item stays pending.

use std::fmt;

use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::store::StoreError;

/// Which uniqueness or state rule a request collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// A pending chat request already exists between the two users
    DuplicatePending,
    /// The author already reviewed this resource
    DuplicateReview,
    /// The record already left its pending state
    AlreadyResolved,
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::DuplicatePending => "DUPLICATE_PENDING",
            ConflictKind::DuplicateReview => "DUPLICATE_REVIEW",
            ConflictKind::AlreadyResolved => "ALREADY_RESOLVED",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors returned by community services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommunityError {
    /// Missing or invalid required field
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// No identity
    #[error("Authentication required")]
    Unauthorized,

    /// Identity present but not allowed
    #[error("Not permitted")]
    Forbidden,

    /// Absent, or not visible to the caller
    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    /// Conversation provisioning stopped part way; safe to retry
    #[error("Conversation provisioning incomplete for request {request_id}: {message}")]
    Provisioning { request_id: Uuid, message: String },

    /// Storage failure. The detail is logged, never displayed.
    #[error("Internal error")]
    Internal(String),
}

impl CommunityError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CommunityError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a required field that was empty or missing.
    pub fn required(field: impl Into<String>) -> Self {
        Self::validation(field, "is required")
    }

    /// Stable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            CommunityError::Validation { .. } => "VALIDATION",
            CommunityError::Unauthorized => "UNAUTHORIZED",
            CommunityError::Forbidden => "FORBIDDEN",
            CommunityError::NotFound => "NOT_FOUND",
            CommunityError::Conflict(kind) => kind.code(),
            CommunityError::Provisioning { .. } => "PROVISIONING_INCOMPLETE",
            CommunityError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the same call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommunityError::Provisioning { .. } | CommunityError::Internal(_)
        )
    }
}

impl From<StoreError> for CommunityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Denied => CommunityError::Forbidden,
            StoreError::NotFound => CommunityError::NotFound,
            StoreError::Unavailable(detail) => {
                error!(error = %detail, "Store failure");
                CommunityError::Internal(detail)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CommunityError>;
