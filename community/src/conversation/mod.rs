//! Conversations between members, or between a member and a companion.

mod companion;

pub use companion::{CompanionReply, CompanionService};

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use moderation::{sanitize_html, to_plain_text};

use crate::error::{CommunityError, Result};
use crate::store::{Caller, ConversationFilter, Store};
use crate::types::{Conversation, ConversationKind, Message, Participant, UserId, Visibility};

/// A conversation with its participant set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation: Conversation,
    pub participants: Vec<Participant>,
}

impl ConversationView {
    pub fn includes(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user)
    }
}

/// Conversation lookup, membership and messages.
pub struct ConversationService {
    store: Arc<dyn Store>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reuse the caller's companion conversation for `ai_agent_type`, or
    /// open one.
    ///
    /// Lookup is keyed on the agent type alone, so a member has at most one
    /// conversation per companion.
    pub async fn find_or_create_companion(
        &self,
        caller: &Caller,
        ai_agent_type: &str,
        loss_type: Option<String>,
        worldview: Option<String>,
    ) -> Result<Conversation> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;

        let ai_agent_type = ai_agent_type.trim();
        if ai_agent_type.is_empty() {
            return Err(CommunityError::required("ai_agent_type"));
        }

        let filter = ConversationFilter::default()
            .participant(user)
            .kind(ConversationKind::Ai)
            .ai_agent_type(ai_agent_type);
        if let Some(existing) = self
            .store
            .list_conversations(caller, &filter)
            .await?
            .into_iter()
            .next()
        {
            debug!(conversation_id = %existing.id, "Reusing companion conversation");
            return Ok(existing);
        }

        let mut conversation = Conversation::companion(ai_agent_type);
        conversation.loss_type = loss_type;
        conversation.worldview = worldview;

        let conversation = self.store.insert_conversation(caller, conversation).await?;
        let joined = self
            .store
            .insert_participant(
                caller,
                Participant {
                    conversation_id: conversation.id,
                    user_id: user,
                },
            )
            .await;

        if let Err(e) = joined {
            // Nobody can see a conversation without participants
            if let Err(cleanup) = self
                .store
                .delete_conversation(&Caller::Service, conversation.id)
                .await
            {
                error!(
                    conversation_id = %conversation.id,
                    error = %cleanup,
                    "Failed to remove companion conversation without participants"
                );
            }
            return Err(e.into());
        }

        info!(
            conversation_id = %conversation.id,
            ai_agent_type = ai_agent_type,
            "Companion conversation created"
        );

        Ok(conversation)
    }

    /// A conversation and its participants.
    ///
    /// Invisible conversations are reported as not found.
    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<ConversationView> {
        let conversation = self
            .store
            .get_conversation(caller, id)
            .await?
            .ok_or(CommunityError::NotFound)?;
        let participants = self.store.list_participants(caller, id).await?;

        Ok(ConversationView {
            conversation,
            participants,
        })
    }

    /// The caller's conversations, most recently active first.
    pub async fn list_for_user(&self, caller: &Caller) -> Result<Vec<Conversation>> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        let filter = ConversationFilter::default().participant(user);
        Ok(self.store.list_conversations(caller, &filter).await?)
    }

    /// Change who besides the participants can read the conversation.
    pub async fn set_visibility(
        &self,
        caller: &Caller,
        id: Uuid,
        visibility: Visibility,
    ) -> Result<Conversation> {
        let view = self.participant_view(caller, id).await?;

        let mut conversation = view.conversation;
        conversation.visibility = visibility;
        Ok(self.store.update_conversation(caller, conversation).await?)
    }

    /// Post a message as the caller.
    pub async fn send_message(&self, caller: &Caller, id: Uuid, content: &str) -> Result<Message> {
        let view = self.participant_view(caller, id).await?;
        let author = caller.user_id().ok_or(CommunityError::Unauthorized)?;

        let content = sanitize_html(content.trim());
        if to_plain_text(&content).is_empty() {
            return Err(CommunityError::required("content"));
        }

        let message = self
            .store
            .insert_message(caller, Message::from_user(id, author, content))
            .await?;
        self.touch(view.conversation).await;

        Ok(message)
    }

    /// The newest `limit` messages, oldest first.
    pub async fn messages(&self, caller: &Caller, id: Uuid, limit: usize) -> Result<Vec<Message>> {
        self.store
            .get_conversation(caller, id)
            .await?
            .ok_or(CommunityError::NotFound)?;
        Ok(self.store.list_messages(caller, id, limit).await?)
    }

    /// The conversation, if the caller participates in it.
    async fn participant_view(&self, caller: &Caller, id: Uuid) -> Result<ConversationView> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        let view = self.get(caller, id).await?;
        if !view.includes(user) {
            return Err(CommunityError::Forbidden);
        }
        Ok(view)
    }

    /// Bump `updated_at` so the conversation sorts as recently active.
    async fn touch(&self, conversation: Conversation) {
        let id = conversation.id;
        if let Err(e) = self.store.update_conversation(&Caller::Service, conversation).await {
            debug!(conversation_id = %id, error = %e, "Failed to bump conversation activity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};

    fn service() -> ConversationService {
        ConversationService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_companion_conversation_is_reused_per_agent() {
        let svc = service();
        let user = Caller::User(Uuid::new_v4());

        let first = svc
            .find_or_create_companion(&user, "grief_companion", Some("parent".into()), None)
            .await
            .unwrap();
        let again = svc
            .find_or_create_companion(&user, "grief_companion", None, None)
            .await
            .unwrap();
        let other = svc
            .find_or_create_companion(&user, "memory_keeper", None, None)
            .await
            .unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.loss_type.as_deref(), Some("parent"));
        assert_eq!(svc.list_for_user(&user).await.unwrap().len(), 2);

        let view = svc.get(&user, first.id).await.unwrap();
        assert_eq!(view.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_join_leaves_no_orphan() {
        let store = Arc::new(MemoryStore::new());
        let svc = ConversationService::new(store.clone());
        let user = Caller::User(Uuid::new_v4());

        store.fail_next(StoreOp::InsertParticipant);
        assert!(svc
            .find_or_create_companion(&user, "grief_companion", None, None)
            .await
            .is_err());
        assert_eq!(store.conversation_count().await, 0);

        let conversation = svc
            .find_or_create_companion(&user, "grief_companion", None, None)
            .await
            .unwrap();
        assert_eq!(store.conversation_count().await, 1);
        assert!(svc.get(&user, conversation.id).await.unwrap().includes(
            user.user_id().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_companions_are_per_user() {
        let svc = service();
        let a = Caller::User(Uuid::new_v4());
        let b = Caller::User(Uuid::new_v4());

        let mine = svc
            .find_or_create_companion(&a, "grief_companion", None, None)
            .await
            .unwrap();
        let theirs = svc
            .find_or_create_companion(&b, "grief_companion", None, None)
            .await
            .unwrap();

        assert_ne!(mine.id, theirs.id);
        assert_eq!(svc.get(&b, mine.id).await, Err(CommunityError::NotFound));
    }

    #[tokio::test]
    async fn test_visibility_controls_third_party_reads() {
        let svc = service();
        let owner = Caller::User(Uuid::new_v4());
        let staff = Caller::Staff(Uuid::new_v4());
        let stranger = Caller::User(Uuid::new_v4());

        let conversation = svc
            .find_or_create_companion(&owner, "grief_companion", None, None)
            .await
            .unwrap();

        assert_eq!(svc.get(&staff, conversation.id).await, Err(CommunityError::NotFound));

        svc.set_visibility(&owner, conversation.id, Visibility::Shared)
            .await
            .unwrap();
        assert!(svc.get(&staff, conversation.id).await.is_ok());
        assert_eq!(
            svc.get(&stranger, conversation.id).await,
            Err(CommunityError::NotFound)
        );

        svc.set_visibility(&owner, conversation.id, Visibility::Public)
            .await
            .unwrap();
        assert!(svc.get(&stranger, conversation.id).await.is_ok());
        assert_eq!(
            svc.set_visibility(&stranger, conversation.id, Visibility::Private)
                .await,
            Err(CommunityError::Forbidden)
        );
        assert_eq!(
            svc.send_message(&stranger, conversation.id, "hello").await,
            Err(CommunityError::Forbidden)
        );
    }

    #[tokio::test]
    async fn test_messages_are_sanitized_and_non_empty() {
        let svc = service();
        let owner = Caller::User(Uuid::new_v4());
        let conversation = svc
            .find_or_create_companion(&owner, "grief_companion", None, None)
            .await
            .unwrap();

        assert_eq!(
            svc.send_message(&owner, conversation.id, "<p> </p>").await,
            Err(CommunityError::required("content"))
        );

        let message = svc
            .send_message(&owner, conversation.id, "<p onclick=\"x\">hard day</p>")
            .await
            .unwrap();
        assert_eq!(message.content, "<p>hard day</p>");

        let history = svc.messages(&owner, conversation.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
