//! Content submission handlers.
//!
//! Every submission follows the same sequence:
//!
//! ```text
//! validate → sanitize → insert PENDING → evaluate → apply policy → persist
//! ```
//!
//! The item is durable as `PENDING` before evaluation starts, so a failed
//! or cancelled evaluation leaves it safely pending for a moderator.

mod draft;
mod review;

pub use draft::{check_required_text, required_text_fields, SubmissionDraft};
pub use review::ReviewQueue;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use moderation::{
    sanitize_html, to_plain_text, ContentType, ModerationCandidate, ModerationEngine,
    ModerationStatus, PolicyTable,
};

use crate::error::{CommunityError, ConflictKind, Result};
use crate::store::{AccessPolicy, CandidateFilter, Caller, Store};

/// Accepts member submissions and applies moderation.
pub struct SubmissionService {
    store: Arc<dyn Store>,
    engine: Arc<ModerationEngine>,
    policies: PolicyTable,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn Store>, engine: Arc<ModerationEngine>) -> Self {
        let policies = PolicyTable::from_config(engine.config());
        Self {
            store,
            engine,
            policies,
        }
    }

    /// Replace the transition policy table.
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Submit a new item.
    ///
    /// Returns the persisted record. An evaluation failure is not an error:
    /// the record simply comes back `PENDING`.
    pub async fn submit(
        &self,
        caller: &Caller,
        draft: SubmissionDraft,
    ) -> Result<ModerationCandidate> {
        let author = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        draft.validate()?;

        let evaluate = draft.needs_evaluation();
        let mut candidate = draft.into_candidate(author);

        if candidate.content_type == ContentType::ResourceReview {
            candidate = self.attach_resource(caller, candidate).await?;
        }

        let candidate = self.store.insert_candidate(caller, candidate).await?;

        info!(
            candidate_id = %candidate.id,
            content_type = %candidate.content_type,
            author_id = %author,
            "Submission saved as pending"
        );

        if !evaluate {
            return Ok(candidate);
        }
        self.moderate(candidate).await
    }

    /// Replace text fields on an item the caller wrote and send it back
    /// through moderation.
    pub async fn resubmit(
        &self,
        caller: &Caller,
        id: Uuid,
        text_fields: BTreeMap<String, String>,
    ) -> Result<ModerationCandidate> {
        let mut candidate = self.owned(caller, id).await?;

        let allowed = required_text_fields(candidate.content_type);
        for (key, value) in text_fields {
            if !allowed.contains(&key.as_str()) && !candidate.text_fields.contains_key(&key) {
                return Err(CommunityError::validation(key, "unknown field"));
            }
            candidate
                .text_fields
                .insert(key, sanitize_html(value.trim()));
        }
        check_required_text(candidate.content_type, |key| {
            candidate.text_fields.get(key).cloned()
        })?;

        self.reenter_pending(caller, candidate).await
    }

    /// Publish or unpublish a journal entry.
    ///
    /// Either way the entry goes back to `PENDING`; publishing also
    /// evaluates it.
    pub async fn set_journal_visibility(
        &self,
        caller: &Caller,
        id: Uuid,
        is_public: bool,
    ) -> Result<ModerationCandidate> {
        let candidate = self.owned(caller, id).await?;

        if candidate.content_type != ContentType::JournalEntry {
            return Err(CommunityError::validation(
                "content_type",
                "only journal entries can change visibility",
            ));
        }

        let candidate = candidate.with_field("is_public", is_public);
        self.reenter_pending(caller, candidate).await
    }

    /// One item, if the caller may see it.
    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<ModerationCandidate> {
        self.store
            .get_candidate(caller, id)
            .await?
            .ok_or(CommunityError::NotFound)
    }

    /// Approved items of one type, newest first: the letters wall, the
    /// resource directory, the therapist directory.
    pub async fn published(
        &self,
        caller: &Caller,
        content_type: ContentType,
    ) -> Result<Vec<ModerationCandidate>> {
        let filter = CandidateFilter::default()
            .content_type(content_type)
            .status(ModerationStatus::Approved);

        let items = self.store.list_candidates(caller, &filter).await?;
        Ok(items.into_iter().filter(AccessPolicy::is_shared).collect())
    }

    /// The caller's own items, any status.
    pub async fn mine(
        &self,
        caller: &Caller,
        content_type: Option<ContentType>,
    ) -> Result<Vec<ModerationCandidate>> {
        let author = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        let mut filter = CandidateFilter::default().author(author);
        filter.content_type = content_type;
        Ok(self.store.list_candidates(caller, &filter).await?)
    }

    async fn owned(&self, caller: &Caller, id: Uuid) -> Result<ModerationCandidate> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        let candidate = self.get(caller, id).await?;
        if candidate.author_id != user {
            return Err(CommunityError::Forbidden);
        }
        Ok(candidate)
    }

    async fn reenter_pending(
        &self,
        caller: &Caller,
        mut candidate: ModerationCandidate,
    ) -> Result<ModerationCandidate> {
        candidate.status = ModerationStatus::Pending;
        candidate.ai_result = None;
        candidate.rejection_reason = None;

        let candidate = self.store.update_candidate(caller, candidate).await?;

        info!(
            candidate_id = %candidate.id,
            content_type = %candidate.content_type,
            "Resubmitted; back to pending"
        );

        if !AccessPolicy::is_shared(&candidate) {
            return Ok(candidate);
        }
        self.moderate(candidate).await
    }

    /// Look up the reviewed resource, reject duplicates and add the
    /// resource title as context for evaluation.
    async fn attach_resource(
        &self,
        caller: &Caller,
        review: ModerationCandidate,
    ) -> Result<ModerationCandidate> {
        let resource_id = review
            .field_str("resource_id")
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| CommunityError::required("resource_id"))?;

        let resource = self
            .store
            .get_candidate(caller, resource_id)
            .await?
            .filter(|r| r.content_type == ContentType::ResourceSubmission)
            .ok_or_else(|| CommunityError::validation("resource_id", "unknown resource"))?;

        let existing = CandidateFilter::default()
            .content_type(ContentType::ResourceReview)
            .author(review.author_id)
            .field("resource_id", resource_id.to_string());
        if !self.store.list_candidates(caller, &existing).await?.is_empty() {
            return Err(CommunityError::Conflict(ConflictKind::DuplicateReview));
        }

        let title = resource.text("title").map(to_plain_text).unwrap_or_default();
        Ok(review.with_field("resource_title", title))
    }

    /// Evaluate a stored pending item and persist the result with the
    /// service credential.
    async fn moderate(&self, candidate: ModerationCandidate) -> Result<ModerationCandidate> {
        let outcome = self.engine.evaluate(&candidate).await;

        let Some(result) = outcome.result() else {
            return Ok(candidate);
        };

        let status = self.policies.transition(candidate.content_type, &outcome);
        let candidate_id = candidate.id;
        let mut updated = candidate;
        updated.status = status;
        updated.ai_result = Some(result.clone());

        match self.store.update_candidate(&Caller::Service, updated).await {
            Ok(saved) => {
                info!(
                    candidate_id = %saved.id,
                    content_type = %saved.content_type,
                    status = saved.status.as_str(),
                    "Moderation applied"
                );
                Ok(saved)
            }
            Err(e) => {
                error!(
                    candidate_id = %candidate_id,
                    error = %e,
                    status = status.as_str(),
                    "Failed to apply moderation result; item stays pending"
                );
                Err(CommunityError::Internal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};
    use moderation::backend::MockBackend;
    use moderation::ModerationConfig;

    const APPROVE_HIGH: &str = r#"{"decision":"APPROVE","confidence":0.95,"reason":"heartfelt"}"#;
    const APPROVE_LOW: &str = r#"{"decision":"APPROVE","confidence":0.6,"reason":"unsure"}"#;
    const REJECT: &str = r#"{"decision":"REJECT","confidence":0.97,"reason":"spam"}"#;

    fn service(store: Arc<MemoryStore>, response: &str) -> SubmissionService {
        let backend = Arc::new(MockBackend::default().with_response(response));
        let engine = Arc::new(ModerationEngine::new(backend, ModerationConfig::default()));
        SubmissionService::new(store, engine)
    }

    fn letter() -> SubmissionDraft {
        SubmissionDraft::Letter {
            content: "<p>I miss my mother</p>".to_string(),
            recipient: None,
            loss_type: Some("parent".to_string()),
        }
    }

    fn journal(is_public: bool) -> SubmissionDraft {
        SubmissionDraft::JournalEntry {
            title: "First winter".to_string(),
            content: "<p>The house is so quiet.</p>".to_string(),
            is_public,
            mood: None,
        }
    }

    #[tokio::test]
    async fn test_anonymous_cannot_submit() {
        let svc = service(Arc::new(MemoryStore::new()), APPROVE_HIGH);
        assert_eq!(
            svc.submit(&Caller::Anonymous, letter()).await,
            Err(CommunityError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_letter_auto_approves_on_high_confidence() {
        let svc = service(Arc::new(MemoryStore::new()), APPROVE_HIGH);
        let caller = Caller::User(Uuid::new_v4());

        let saved = svc.submit(&caller, letter()).await.unwrap();
        assert_eq!(saved.status, ModerationStatus::Approved);
        assert!(saved.ai_result.unwrap().auto_approve);
    }

    #[tokio::test]
    async fn test_letter_reject_stays_pending() {
        let svc = service(Arc::new(MemoryStore::new()), REJECT);
        let caller = Caller::User(Uuid::new_v4());

        let saved = svc.submit(&caller, letter()).await.unwrap();
        assert_eq!(saved.status, ModerationStatus::Pending);
        assert!(saved.ai_result.is_some());
    }

    #[tokio::test]
    async fn test_public_journal_follows_raw_decision() {
        let svc = service(Arc::new(MemoryStore::new()), REJECT);
        let caller = Caller::User(Uuid::new_v4());

        let saved = svc.submit(&caller, journal(true)).await.unwrap();
        assert_eq!(saved.status, ModerationStatus::Rejected);

        let svc = service(Arc::new(MemoryStore::new()), APPROVE_LOW);
        let saved = svc.submit(&caller, journal(true)).await.unwrap();
        assert_eq!(saved.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn test_private_journal_is_not_evaluated() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::default().with_response(APPROVE_HIGH));
        let engine = Arc::new(ModerationEngine::new(
            backend.clone(),
            ModerationConfig::default(),
        ));
        let svc = SubmissionService::new(store, engine);
        let caller = Caller::User(Uuid::new_v4());

        let saved = svc.submit(&caller, journal(false)).await.unwrap();
        assert_eq!(saved.status, ModerationStatus::Pending);
        assert_eq!(backend.call_count(), 0);

        let published = svc
            .set_journal_visibility(&caller, saved.id, true)
            .await
            .unwrap();
        assert_eq!(published.status, ModerationStatus::Approved);
        assert_eq!(backend.call_count(), 1);

        let hidden = svc
            .set_journal_visibility(&caller, saved.id, false)
            .await
            .unwrap();
        assert_eq!(hidden.status, ModerationStatus::Pending);
        assert!(svc
            .published(&Caller::Anonymous, ContentType::JournalEntry)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_status_update_failure_is_internal_and_leaves_pending() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), APPROVE_HIGH);
        let caller = Caller::User(Uuid::new_v4());

        store.fail_next(StoreOp::UpdateCandidate);
        let err = svc.submit(&caller, letter()).await.unwrap_err();
        assert!(matches!(err, CommunityError::Internal(_)));

        let mine = svc.mine(&caller, None).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, ModerationStatus::Pending);
    }

    #[tokio::test]
    async fn test_resubmit_only_by_author() {
        let svc = service(Arc::new(MemoryStore::new()), APPROVE_LOW);
        let author = Caller::User(Uuid::new_v4());
        let saved = svc.submit(&author, letter()).await.unwrap();

        let mut edit = BTreeMap::new();
        edit.insert("content".to_string(), "<p>I still miss her</p>".to_string());

        let staff = Caller::Staff(Uuid::new_v4());
        assert_eq!(
            svc.resubmit(&staff, saved.id, edit.clone()).await,
            Err(CommunityError::Forbidden)
        );

        let stranger = Caller::User(Uuid::new_v4());
        assert_eq!(
            svc.resubmit(&stranger, saved.id, edit.clone()).await,
            Err(CommunityError::NotFound)
        );

        let updated = svc.resubmit(&author, saved.id, edit).await.unwrap();
        assert_eq!(updated.text("content"), Some("<p>I still miss her</p>"));
        assert_eq!(updated.status, ModerationStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_review_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), APPROVE_HIGH);
        let author = Caller::User(Uuid::new_v4());

        let resource = svc
            .submit(
                &author,
                SubmissionDraft::ResourceSubmission {
                    title: "Grief Share".to_string(),
                    url: "https://example.org".to_string(),
                    description: "Weekly support groups".to_string(),
                    category: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(resource.status, ModerationStatus::Approved);

        let reviewer = Caller::User(Uuid::new_v4());
        let review = || SubmissionDraft::ResourceReview {
            resource_id: Some(resource.id),
            rating: Some(5),
            comment: "Kind people".to_string(),
        };

        let first = svc.submit(&reviewer, review()).await.unwrap();
        assert_eq!(first.field_str("resource_title"), Some("Grief Share"));
        assert_eq!(
            svc.submit(&reviewer, review()).await,
            Err(CommunityError::Conflict(ConflictKind::DuplicateReview))
        );
    }

    #[tokio::test]
    async fn test_review_of_unknown_resource() {
        let svc = service(Arc::new(MemoryStore::new()), APPROVE_HIGH);
        let reviewer = Caller::User(Uuid::new_v4());

        let err = svc
            .submit(
                &reviewer,
                SubmissionDraft::ResourceReview {
                    resource_id: Some(Uuid::new_v4()),
                    rating: Some(3),
                    comment: "ok".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommunityError::Validation { field, .. } if field == "resource_id"));
    }
}
