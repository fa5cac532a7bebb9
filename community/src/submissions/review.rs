//! Staff review queue.
//!
//! Human decisions are the only way a gated item becomes `REJECTED`.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use moderation::{ContentType, ModerationCandidate, ModerationStatus};

use crate::error::{CommunityError, ConflictKind, Result};
use crate::store::{AccessPolicy, CandidateFilter, Caller, Order, Store};

/// Pending items awaiting a moderator.
pub struct ReviewQueue {
    store: Arc<dyn Store>,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn require_staff(caller: &Caller) -> Result<()> {
        match caller {
            Caller::Anonymous => Err(CommunityError::Unauthorized),
            Caller::User(_) => Err(CommunityError::Forbidden),
            Caller::Staff(_) | Caller::Service => Ok(()),
        }
    }

    /// Pending shared items, oldest first. Private journal entries never
    /// reach the queue.
    pub async fn pending(
        &self,
        caller: &Caller,
        content_type: Option<ContentType>,
    ) -> Result<Vec<ModerationCandidate>> {
        Self::require_staff(caller)?;

        let mut filter = CandidateFilter::default()
            .status(ModerationStatus::Pending)
            .order(Order::OldestFirst);
        filter.content_type = content_type;

        let items = self.store.list_candidates(caller, &filter).await?;
        Ok(items.into_iter().filter(AccessPolicy::is_shared).collect())
    }

    pub async fn approve(&self, caller: &Caller, id: Uuid) -> Result<ModerationCandidate> {
        self.decide(caller, id, ModerationStatus::Approved, None).await
    }

    /// Reject with a reason shown to the author.
    pub async fn reject(
        &self,
        caller: &Caller,
        id: Uuid,
        reason: &str,
    ) -> Result<ModerationCandidate> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CommunityError::required("reason"));
        }
        self.decide(caller, id, ModerationStatus::Rejected, Some(reason.to_string()))
            .await
    }

    async fn decide(
        &self,
        caller: &Caller,
        id: Uuid,
        status: ModerationStatus,
        reason: Option<String>,
    ) -> Result<ModerationCandidate> {
        Self::require_staff(caller)?;

        let mut candidate = self
            .store
            .get_candidate(caller, id)
            .await?
            .filter(AccessPolicy::is_shared)
            .ok_or(CommunityError::NotFound)?;

        if candidate.status != ModerationStatus::Pending {
            return Err(CommunityError::Conflict(ConflictKind::AlreadyResolved));
        }

        candidate.status = status;
        candidate.rejection_reason = reason;
        let saved = self.store.update_candidate(caller, candidate).await?;

        info!(
            candidate_id = %saved.id,
            content_type = %saved.content_type,
            moderator = ?caller.user_id(),
            status = saved.status.as_str(),
            "Moderator decision recorded"
        );

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, ModerationCandidate) {
        let store = Arc::new(MemoryStore::new());
        let author = Uuid::new_v4();
        let candidate = store
            .insert_candidate(
                &Caller::User(author),
                ModerationCandidate::new(author, ContentType::Letter).with_text("content", "hi"),
            )
            .await
            .unwrap();
        (store, candidate)
    }

    #[tokio::test]
    async fn test_non_staff_forbidden() {
        let (store, candidate) = seeded().await;
        let queue = ReviewQueue::new(store);

        assert_eq!(
            queue.pending(&Caller::User(Uuid::new_v4()), None).await,
            Err(CommunityError::Forbidden)
        );
        assert_eq!(
            queue.approve(&Caller::Anonymous, candidate.id).await,
            Err(CommunityError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_resolves_once() {
        let (store, candidate) = seeded().await;
        let queue = ReviewQueue::new(store);
        let staff = Caller::Staff(Uuid::new_v4());

        assert_eq!(queue.pending(&staff, Some(ContentType::Letter)).await.unwrap().len(), 1);
        assert_eq!(
            queue.reject(&staff, candidate.id, "  ").await,
            Err(CommunityError::required("reason"))
        );

        let rejected = queue
            .reject(&staff, candidate.id, "Contains a phone number")
            .await
            .unwrap();
        assert_eq!(rejected.status, ModerationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Contains a phone number"));

        assert_eq!(
            queue.approve(&staff, candidate.id).await,
            Err(CommunityError::Conflict(ConflictKind::AlreadyResolved))
        );
        assert!(queue.pending(&staff, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_private_journal_stays_out_of_review() {
        let store = Arc::new(MemoryStore::new());
        let author = Uuid::new_v4();
        let entry = store
            .insert_candidate(
                &Caller::User(author),
                ModerationCandidate::new(author, ContentType::JournalEntry)
                    .with_text("content", "<p>private thoughts</p>")
                    .with_field("is_public", false),
            )
            .await
            .unwrap();
        let queue = ReviewQueue::new(store.clone());

        for reviewer in [Caller::Staff(Uuid::new_v4()), Caller::Service] {
            assert!(queue.pending(&reviewer, None).await.unwrap().is_empty());
            assert_eq!(
                queue.approve(&reviewer, entry.id).await,
                Err(CommunityError::NotFound)
            );
        }

        let stored = store
            .get_candidate(&Caller::User(author), entry.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ModerationStatus::Pending);
        assert!(store
            .get_candidate(&Caller::User(Uuid::new_v4()), entry.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_approve_publishes() {
        let (store, candidate) = seeded().await;
        let queue = ReviewQueue::new(store.clone());

        queue
            .approve(&Caller::Staff(Uuid::new_v4()), candidate.id)
            .await
            .unwrap();

        let visible = store
            .get_candidate(&Caller::Anonymous, candidate.id)
            .await
            .unwrap();
        assert!(visible.is_some());
    }
}
