//! Submission payloads and their validation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use moderation::{sanitize_html, to_plain_text, ContentType, ModerationCandidate};

use crate::error::{CommunityError, Result};
use crate::types::UserId;

/// A member's submission, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "contentType", rename_all = "snake_case")]
pub enum SubmissionDraft {
    Letter {
        /// Rich text
        content: String,
        /// Who the letter is written to ("Mom", "my brother")
        #[serde(default)]
        recipient: Option<String>,
        #[serde(default, rename = "lossType")]
        loss_type: Option<String>,
    },
    JournalEntry {
        title: String,
        content: String,
        /// Published to the community rather than kept private
        #[serde(default, rename = "isPublic")]
        is_public: bool,
        #[serde(default)]
        mood: Option<String>,
    },
    ResourceSubmission {
        title: String,
        url: String,
        description: String,
        #[serde(default)]
        category: Option<String>,
    },
    ResourceReview {
        #[serde(rename = "resourceId")]
        resource_id: Option<Uuid>,
        rating: Option<i64>,
        comment: String,
    },
    TherapistApplication {
        #[serde(rename = "fullName")]
        full_name: String,
        credentials: String,
        bio: String,
        #[serde(default)]
        specialties: Vec<String>,
        #[serde(default)]
        website: Option<String>,
    },
}

/// Required free-text fields per content type.
pub fn required_text_fields(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Letter => &["content"],
        ContentType::JournalEntry => &["title", "content"],
        ContentType::ResourceSubmission => &["title", "url", "description"],
        ContentType::ResourceReview => &["comment"],
        ContentType::TherapistApplication => &["full_name", "credentials", "bio"],
    }
}

/// Fail with the first required text field that has no visible text.
pub fn check_required_text(
    content_type: ContentType,
    text: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    for field in required_text_fields(content_type) {
        let present = text(field).is_some_and(|v| !to_plain_text(&v).is_empty());
        if !present {
            return Err(CommunityError::required(*field));
        }
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SubmissionDraft {
    pub fn content_type(&self) -> ContentType {
        match self {
            SubmissionDraft::Letter { .. } => ContentType::Letter,
            SubmissionDraft::JournalEntry { .. } => ContentType::JournalEntry,
            SubmissionDraft::ResourceSubmission { .. } => ContentType::ResourceSubmission,
            SubmissionDraft::ResourceReview { .. } => ContentType::ResourceReview,
            SubmissionDraft::TherapistApplication { .. } => ContentType::TherapistApplication,
        }
    }

    fn text_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            SubmissionDraft::Letter { content, .. } => vec![("content", content.as_str())],
            SubmissionDraft::JournalEntry { title, content, .. } => {
                vec![("title", title.as_str()), ("content", content.as_str())]
            }
            SubmissionDraft::ResourceSubmission {
                title,
                url,
                description,
                ..
            } => vec![
                ("title", title.as_str()),
                ("url", url.as_str()),
                ("description", description.as_str()),
            ],
            SubmissionDraft::ResourceReview { comment, .. } => vec![("comment", comment.as_str())],
            SubmissionDraft::TherapistApplication {
                full_name,
                credentials,
                bio,
                ..
            } => vec![
                ("full_name", full_name.as_str()),
                ("credentials", credentials.as_str()),
                ("bio", bio.as_str()),
            ],
        }
    }

    /// Check required fields, reporting the first one that fails.
    pub fn validate(&self) -> Result<()> {
        let fields = self.text_fields();
        check_required_text(self.content_type(), |key| {
            fields
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })?;

        match self {
            SubmissionDraft::ResourceSubmission { url, .. } => {
                let url = url.trim();
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(CommunityError::validation("url", "must be an http(s) link"));
                }
            }
            SubmissionDraft::ResourceReview {
                resource_id,
                rating,
                ..
            } => {
                if resource_id.is_none() {
                    return Err(CommunityError::required("resource_id"));
                }
                match rating {
                    None => return Err(CommunityError::required("rating")),
                    Some(r) if !(1..=5).contains(r) => {
                        return Err(CommunityError::validation(
                            "rating",
                            "must be between 1 and 5",
                        ))
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Whether the item goes to evaluation on submit.
    ///
    /// Private journal entries are only ever visible to their author.
    pub fn needs_evaluation(&self) -> bool {
        !matches!(
            self,
            SubmissionDraft::JournalEntry {
                is_public: false,
                ..
            }
        )
    }

    /// Build a pending candidate with sanitized text.
    ///
    /// Call [`SubmissionDraft::validate`] first.
    pub fn into_candidate(self, author_id: UserId) -> ModerationCandidate {
        let content_type = self.content_type();
        let mut candidate = ModerationCandidate::new(author_id, content_type);

        for (key, value) in self.text_fields() {
            candidate
                .text_fields
                .insert(key.to_string(), sanitize_html(value.trim()));
        }

        match self {
            SubmissionDraft::Letter {
                recipient,
                loss_type,
                ..
            } => {
                if let Some(recipient) = non_empty(&recipient) {
                    candidate = candidate.with_field("recipient", recipient);
                }
                if let Some(loss_type) = non_empty(&loss_type) {
                    candidate = candidate.with_field("loss_type", loss_type);
                }
            }
            SubmissionDraft::JournalEntry {
                is_public, mood, ..
            } => {
                candidate = candidate.with_field("is_public", is_public);
                if let Some(mood) = non_empty(&mood) {
                    candidate = candidate.with_field("mood", mood);
                }
            }
            SubmissionDraft::ResourceSubmission { category, .. } => {
                if let Some(category) = non_empty(&category) {
                    candidate = candidate.with_field("category", category);
                }
            }
            SubmissionDraft::ResourceReview {
                resource_id,
                rating,
                ..
            } => {
                if let Some(resource_id) = resource_id {
                    candidate = candidate.with_field("resource_id", resource_id);
                }
                if let Some(rating) = rating {
                    candidate = candidate.with_field("rating", rating);
                }
            }
            SubmissionDraft::TherapistApplication {
                specialties,
                website,
                ..
            } => {
                let specialties: Vec<String> = specialties
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if !specialties.is_empty() {
                    candidate = candidate.with_field("specialties", specialties);
                }
                if let Some(website) = non_empty(&website) {
                    candidate = candidate.with_field("website", website);
                }
            }
        }

        candidate
    }
}
