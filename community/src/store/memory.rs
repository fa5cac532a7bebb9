//! In-process store with row-level filtering.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use moderation::ModerationCandidate;

use super::access::AccessPolicy;
use super::{
    CandidateFilter, Caller, ChatRequestFilter, ConversationFilter, Order, Store, StoreError,
    StoreResult,
};
use crate::types::{ChatRequest, Conversation, Message, Participant, Profile, UserId};

/// Store operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    InsertCandidate,
    UpdateCandidate,
    ReadCandidate,
    InsertChatRequest,
    UpdateChatRequest,
    ReadChatRequest,
    InsertConversation,
    UpdateConversation,
    ReadConversation,
    DeleteConversation,
    InsertParticipant,
    InsertMessage,
    ReadMessage,
    WriteProfile,
    ReadProfile,
}

#[derive(Default)]
struct Tables {
    candidates: HashMap<Uuid, ModerationCandidate>,
    chat_requests: HashMap<Uuid, ChatRequest>,
    conversations: HashMap<Uuid, Conversation>,
    participants: HashMap<Uuid, Vec<Participant>>,
    messages: HashMap<Uuid, Vec<Message>>,
    profiles: HashMap<UserId, Profile>,
}

impl Tables {
    fn participants_of(&self, conversation_id: Uuid) -> &[Participant] {
        self.participants
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The conversation, if it exists and `caller` may see it.
    fn visible_conversation(&self, caller: &Caller, id: Uuid) -> Option<&Conversation> {
        self.conversations.get(&id).filter(|c| {
            AccessPolicy::can_read_conversation(caller, c, self.participants_of(id))
        })
    }
}

/// In-memory [`Store`].
///
/// All tables sit behind one lock, so each operation observes a consistent
/// snapshot across tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Pending injected failures per operation
    failures: DashMap<StoreOp, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_times(op, 1);
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: StoreOp, times: usize) {
        *self.failures.entry(op).or_insert(0) += times;
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        let mut injected = false;
        self.failures.remove_if_mut(&op, |_, remaining| {
            injected = true;
            *remaining -= 1;
            *remaining == 0
        });

        if injected {
            debug!(?op, "Injected store failure");
            return Err(StoreError::Unavailable(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }

    /// Count of every conversation, ignoring visibility.
    pub async fn conversation_count(&self) -> usize {
        self.tables.read().await.conversations.len()
    }
}

fn sort_by_created<T>(rows: &mut [T], order: Order, created: impl Fn(&T) -> chrono::DateTime<Utc>) {
    match order {
        Order::NewestFirst => rows.sort_by_key(|r| std::cmp::Reverse(created(r))),
        Order::OldestFirst => rows.sort_by_key(|r| created(r)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_candidate(
        &self,
        caller: &Caller,
        candidate: ModerationCandidate,
    ) -> StoreResult<ModerationCandidate> {
        self.check(StoreOp::InsertCandidate)?;
        if !AccessPolicy::can_insert_candidate(caller, &candidate) {
            return Err(StoreError::Denied);
        }

        let mut tables = self.tables.write().await;
        tables.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn update_candidate(
        &self,
        caller: &Caller,
        mut candidate: ModerationCandidate,
    ) -> StoreResult<ModerationCandidate> {
        self.check(StoreOp::UpdateCandidate)?;
        let mut tables = self.tables.write().await;

        let existing = tables
            .candidates
            .get(&candidate.id)
            .filter(|c| AccessPolicy::can_read_candidate(caller, c))
            .ok_or(StoreError::NotFound)?;

        if !AccessPolicy::can_update_candidate(caller, existing, &candidate) {
            return Err(StoreError::Denied);
        }

        candidate.created_at = existing.created_at;
        candidate.updated_at = Utc::now();
        tables.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn get_candidate(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> StoreResult<Option<ModerationCandidate>> {
        self.check(StoreOp::ReadCandidate)?;
        let tables = self.tables.read().await;
        Ok(tables
            .candidates
            .get(&id)
            .filter(|c| AccessPolicy::can_read_candidate(caller, c))
            .cloned())
    }

    async fn list_candidates(
        &self,
        caller: &Caller,
        filter: &CandidateFilter,
    ) -> StoreResult<Vec<ModerationCandidate>> {
        self.check(StoreOp::ReadCandidate)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .candidates
            .values()
            .filter(|c| AccessPolicy::can_read_candidate(caller, c) && filter.matches(c))
            .cloned()
            .collect();
        sort_by_created(&mut rows, filter.order, |c| c.created_at);
        Ok(rows)
    }

    async fn insert_chat_request(
        &self,
        caller: &Caller,
        request: ChatRequest,
    ) -> StoreResult<ChatRequest> {
        self.check(StoreOp::InsertChatRequest)?;
        if !AccessPolicy::can_insert_chat_request(caller, &request) {
            return Err(StoreError::Denied);
        }

        let mut tables = self.tables.write().await;
        tables.chat_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn update_chat_request(
        &self,
        caller: &Caller,
        mut request: ChatRequest,
    ) -> StoreResult<ChatRequest> {
        self.check(StoreOp::UpdateChatRequest)?;
        let mut tables = self.tables.write().await;

        let existing = tables
            .chat_requests
            .get(&request.id)
            .filter(|r| AccessPolicy::can_read_chat_request(caller, r))
            .ok_or(StoreError::NotFound)?;

        if !AccessPolicy::can_update_chat_request(caller, existing, &request) {
            return Err(StoreError::Denied);
        }

        request.created_at = existing.created_at;
        request.updated_at = Utc::now();
        tables.chat_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_chat_request(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<ChatRequest>> {
        self.check(StoreOp::ReadChatRequest)?;
        let tables = self.tables.read().await;
        Ok(tables
            .chat_requests
            .get(&id)
            .filter(|r| AccessPolicy::can_read_chat_request(caller, r))
            .cloned())
    }

    async fn list_chat_requests(
        &self,
        caller: &Caller,
        filter: &ChatRequestFilter,
    ) -> StoreResult<Vec<ChatRequest>> {
        self.check(StoreOp::ReadChatRequest)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .chat_requests
            .values()
            .filter(|r| AccessPolicy::can_read_chat_request(caller, r) && filter.matches(r))
            .cloned()
            .collect();
        sort_by_created(&mut rows, filter.order, |r| r.created_at);
        Ok(rows)
    }

    async fn insert_conversation(
        &self,
        caller: &Caller,
        conversation: Conversation,
    ) -> StoreResult<Conversation> {
        self.check(StoreOp::InsertConversation)?;
        if !AccessPolicy::can_insert_conversation(caller) {
            return Err(StoreError::Denied);
        }

        let mut tables = self.tables.write().await;
        if tables.conversations.contains_key(&conversation.id) {
            return Err(StoreError::Denied);
        }
        tables.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn update_conversation(
        &self,
        caller: &Caller,
        mut conversation: Conversation,
    ) -> StoreResult<Conversation> {
        self.check(StoreOp::UpdateConversation)?;
        let mut tables = self.tables.write().await;

        let existing = tables
            .visible_conversation(caller, conversation.id)
            .ok_or(StoreError::NotFound)?;

        if !AccessPolicy::can_update_conversation(caller, tables.participants_of(conversation.id)) {
            return Err(StoreError::Denied);
        }

        conversation.kind = existing.kind;
        conversation.created_at = existing.created_at;
        conversation.updated_at = Utc::now();
        tables.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> StoreResult<Option<Conversation>> {
        self.check(StoreOp::ReadConversation)?;
        let tables = self.tables.read().await;
        Ok(tables.visible_conversation(caller, id).cloned())
    }

    async fn list_conversations(
        &self,
        caller: &Caller,
        filter: &ConversationFilter,
    ) -> StoreResult<Vec<Conversation>> {
        self.check(StoreOp::ReadConversation)?;
        let tables = self.tables.read().await;

        let mut rows: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| {
                let participants = tables.participants_of(c.id);
                AccessPolicy::can_read_conversation(caller, c, participants)
                    && filter
                        .participant
                        .is_none_or(|u| participants.iter().any(|p| p.user_id == u))
                    && filter.kind.is_none_or(|k| c.kind == k)
                    && filter
                        .ai_agent_type
                        .as_ref()
                        .is_none_or(|t| c.ai_agent_type.as_ref() == Some(t))
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| std::cmp::Reverse(c.updated_at));
        Ok(rows)
    }

    async fn delete_conversation(&self, caller: &Caller, id: Uuid) -> StoreResult<()> {
        self.check(StoreOp::DeleteConversation)?;
        if !AccessPolicy::can_delete_conversation(caller) {
            return Err(StoreError::Denied);
        }

        let mut tables = self.tables.write().await;
        tables.conversations.remove(&id).ok_or(StoreError::NotFound)?;
        tables.participants.remove(&id);
        tables.messages.remove(&id);
        Ok(())
    }

    async fn insert_participant(
        &self,
        caller: &Caller,
        participant: Participant,
    ) -> StoreResult<Participant> {
        self.check(StoreOp::InsertParticipant)?;
        let mut tables = self.tables.write().await;

        if !tables.conversations.contains_key(&participant.conversation_id) {
            return Err(StoreError::NotFound);
        }

        let existing = tables.participants_of(participant.conversation_id);
        if existing.contains(&participant) {
            return Ok(participant);
        }
        if !AccessPolicy::can_insert_participant(caller, &participant, existing) {
            return Err(StoreError::Denied);
        }

        tables
            .participants
            .entry(participant.conversation_id)
            .or_default()
            .push(participant);
        Ok(participant)
    }

    async fn list_participants(
        &self,
        caller: &Caller,
        conversation_id: Uuid,
    ) -> StoreResult<Vec<Participant>> {
        self.check(StoreOp::ReadConversation)?;
        let tables = self.tables.read().await;
        if tables.visible_conversation(caller, conversation_id).is_none() {
            return Ok(Vec::new());
        }
        Ok(tables.participants_of(conversation_id).to_vec())
    }

    async fn insert_message(&self, caller: &Caller, message: Message) -> StoreResult<Message> {
        self.check(StoreOp::InsertMessage)?;
        let mut tables = self.tables.write().await;

        if tables
            .visible_conversation(caller, message.conversation_id)
            .is_none()
        {
            return Err(StoreError::NotFound);
        }
        if !AccessPolicy::can_insert_message(caller, tables.participants_of(message.conversation_id))
        {
            return Err(StoreError::Denied);
        }

        tables
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        caller: &Caller,
        conversation_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        self.check(StoreOp::ReadMessage)?;
        let tables = self.tables.read().await;
        if tables.visible_conversation(caller, conversation_id).is_none() {
            return Ok(Vec::new());
        }

        let all = tables
            .messages
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all[skip..].to_vec())
    }

    async fn upsert_profile(&self, caller: &Caller, profile: Profile) -> StoreResult<Profile> {
        self.check(StoreOp::WriteProfile)?;
        if !AccessPolicy::can_write_profile(caller, &profile) {
            return Err(StoreError::Denied);
        }

        let mut tables = self.tables.write().await;
        tables.profiles.insert(profile.user_id, profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, caller: &Caller, user_id: UserId) -> StoreResult<Option<Profile>> {
        self.check(StoreOp::ReadProfile)?;
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .get(&user_id)
            .filter(|p| AccessPolicy::can_read_profile(caller, p))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moderation::{ContentType, ModerationStatus};

    #[tokio::test]
    async fn test_invisible_rows_behave_as_absent() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let candidate = ModerationCandidate::new(author, ContentType::Letter);
        let id = candidate.id;

        store
            .insert_candidate(&Caller::User(author), candidate.clone())
            .await
            .unwrap();

        let stranger = Caller::User(Uuid::new_v4());
        assert!(store.get_candidate(&stranger, id).await.unwrap().is_none());
        assert_eq!(
            store.update_candidate(&stranger, candidate).await,
            Err(StoreError::NotFound)
        );
        assert!(store.get_candidate(&Caller::User(author), id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_member_cannot_approve_own_item() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let caller = Caller::User(author);
        let mut candidate = store
            .insert_candidate(&caller, ModerationCandidate::new(author, ContentType::Letter))
            .await
            .unwrap();

        candidate.status = ModerationStatus::Approved;
        assert_eq!(
            store.update_candidate(&caller, candidate.clone()).await,
            Err(StoreError::Denied)
        );

        let updated = store.update_candidate(&Caller::Service, candidate).await.unwrap();
        assert_eq!(updated.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::ReadProfile);

        let user = Uuid::new_v4();
        assert!(matches!(
            store.get_profile(&Caller::User(user), user).await,
            Err(StoreError::Unavailable(_))
        ));
        tokio_test::assert_ok!(store.get_profile(&Caller::User(user), user).await);
    }

    #[tokio::test]
    async fn test_participants_and_messages() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = store
            .insert_conversation(&Caller::Service, Conversation::human())
            .await
            .unwrap();

        for user in [a, b] {
            store
                .insert_participant(
                    &Caller::Service,
                    Participant {
                        conversation_id: conversation.id,
                        user_id: user,
                    },
                )
                .await
                .unwrap();
        }

        let outsider = Caller::User(Uuid::new_v4());
        assert!(store
            .list_participants(&outsider, conversation.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .insert_message(&outsider, Message::from_user(conversation.id, a, "hi"))
                .await,
            Err(StoreError::NotFound)
        );

        for i in 0..5 {
            store
                .insert_message(
                    &Caller::User(a),
                    Message::from_user(conversation.id, a, format!("m{}", i)),
                )
                .await
                .unwrap();
        }

        let recent = store
            .list_messages(&Caller::User(b), conversation.id, 2)
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
    }

    #[tokio::test]
    async fn test_duplicate_participant_is_noop() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let conversation = store
            .insert_conversation(&Caller::User(a), Conversation::companion("grief_companion"))
            .await
            .unwrap();
        let participant = Participant {
            conversation_id: conversation.id,
            user_id: a,
        };

        store.insert_participant(&Caller::User(a), participant).await.unwrap();
        store.insert_participant(&Caller::User(a), participant).await.unwrap();

        let members = store
            .list_participants(&Caller::User(a), conversation.id)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
    }
}
