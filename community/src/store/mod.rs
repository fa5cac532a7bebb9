//! Storage seam for community records.
//!
//! The backing store applies row-level filtering based on the [`Caller`]:
//! writes that break a rule fail with [`StoreError::Denied`], reads of rows
//! the caller may not see behave as if the rows did not exist.
//! [`Caller::Service`] is the trusted credential that bypasses filtering
//! for cross-user work such as applying moderation results or provisioning
//! a conversation for two other users.

mod access;
mod memory;

pub use access::AccessPolicy;
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use uuid::Uuid;

use moderation::{ContentType, ModerationCandidate, ModerationStatus};

use crate::types::{
    ChatRequest, ChatRequestStatus, Conversation, ConversationKind, Message, Participant, Profile,
    UserId,
};

/// Identity a store operation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    /// No session
    Anonymous,
    /// Signed-in member
    User(UserId),
    /// Signed-in moderator
    Staff(UserId),
    /// Trusted server credential
    Service,
}

impl Caller {
    /// The member id, for users and staff.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Caller::User(id) | Caller::Staff(id) => Some(*id),
            Caller::Anonymous | Caller::Service => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Caller::Staff(_))
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Caller::Service)
    }

    /// Staff or service.
    pub fn is_privileged(&self) -> bool {
        self.is_staff() || self.is_service()
    }

    /// Whether this caller is the member `user`.
    pub fn is(&self, user: UserId) -> bool {
        self.user_id() == Some(user)
    }
}

/// Errors from the backing store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Row-level rule rejected the write
    #[error("Denied by row-level policy")]
    Denied,

    /// Row to update does not exist (or is not visible)
    #[error("Row not found")]
    NotFound,

    /// Store could not complete the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result ordering by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Equality filters for moderation candidates.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub content_type: Option<ContentType>,
    pub status: Option<ModerationStatus>,
    pub author_id: Option<UserId>,
    /// Structured field equality, e.g. `("resource_id", "<uuid>")`
    pub field: Option<(String, serde_json::Value)>,
    pub order: Order,
}

impl CandidateFilter {
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn status(mut self, status: ModerationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn author(mut self, author_id: UserId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.field = Some((key.into(), value.into()));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, candidate: &ModerationCandidate) -> bool {
        self.content_type.is_none_or(|ty| candidate.content_type == ty)
            && self.status.is_none_or(|s| candidate.status == s)
            && self.author_id.is_none_or(|a| candidate.author_id == a)
            && self
                .field
                .as_ref()
                .is_none_or(|(k, v)| candidate.structured_fields.get(k) == Some(v))
    }
}

/// Equality filters for chat requests.
#[derive(Debug, Clone, Default)]
pub struct ChatRequestFilter {
    pub status: Option<ChatRequestStatus>,
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    /// Either direction between two users
    pub between: Option<(UserId, UserId)>,
    pub order: Order,
}

impl ChatRequestFilter {
    pub fn status(mut self, status: ChatRequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn sender(mut self, sender_id: UserId) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn receiver(mut self, receiver_id: UserId) -> Self {
        self.receiver_id = Some(receiver_id);
        self
    }

    pub fn between(mut self, a: UserId, b: UserId) -> Self {
        self.between = Some((a, b));
        self
    }

    pub fn matches(&self, request: &ChatRequest) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.sender_id.is_none_or(|s| request.sender_id == s)
            && self.receiver_id.is_none_or(|r| request.receiver_id == r)
            && self.between.is_none_or(|(a, b)| request.is_between(a, b))
    }
}

/// Equality filters for conversations.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Conversations this user participates in
    pub participant: Option<UserId>,
    pub kind: Option<ConversationKind>,
    pub ai_agent_type: Option<String>,
}

impl ConversationFilter {
    pub fn participant(mut self, user: UserId) -> Self {
        self.participant = Some(user);
        self
    }

    pub fn kind(mut self, kind: ConversationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn ai_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.ai_agent_type = Some(agent_type.into());
        self
    }
}

/// Typed table access with row-level filtering.
#[async_trait]
pub trait Store: Send + Sync {
    // Moderation candidates

    async fn insert_candidate(
        &self,
        caller: &Caller,
        candidate: ModerationCandidate,
    ) -> StoreResult<ModerationCandidate>;

    async fn update_candidate(
        &self,
        caller: &Caller,
        candidate: ModerationCandidate,
    ) -> StoreResult<ModerationCandidate>;

    async fn get_candidate(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> StoreResult<Option<ModerationCandidate>>;

    async fn list_candidates(
        &self,
        caller: &Caller,
        filter: &CandidateFilter,
    ) -> StoreResult<Vec<ModerationCandidate>>;

    // Chat requests

    async fn insert_chat_request(
        &self,
        caller: &Caller,
        request: ChatRequest,
    ) -> StoreResult<ChatRequest>;

    async fn update_chat_request(
        &self,
        caller: &Caller,
        request: ChatRequest,
    ) -> StoreResult<ChatRequest>;

    async fn get_chat_request(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<ChatRequest>>;

    async fn list_chat_requests(
        &self,
        caller: &Caller,
        filter: &ChatRequestFilter,
    ) -> StoreResult<Vec<ChatRequest>>;

    // Conversations

    async fn insert_conversation(
        &self,
        caller: &Caller,
        conversation: Conversation,
    ) -> StoreResult<Conversation>;

    async fn update_conversation(
        &self,
        caller: &Caller,
        conversation: Conversation,
    ) -> StoreResult<Conversation>;

    async fn get_conversation(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> StoreResult<Option<Conversation>>;

    /// Visible conversations, most recently updated first.
    async fn list_conversations(
        &self,
        caller: &Caller,
        filter: &ConversationFilter,
    ) -> StoreResult<Vec<Conversation>>;

    /// Remove a conversation with its participants and messages.
    async fn delete_conversation(&self, caller: &Caller, id: Uuid) -> StoreResult<()>;

    // Participants

    /// Insert a participant. Inserting an existing participant is a no-op.
    async fn insert_participant(
        &self,
        caller: &Caller,
        participant: Participant,
    ) -> StoreResult<Participant>;

    async fn list_participants(
        &self,
        caller: &Caller,
        conversation_id: Uuid,
    ) -> StoreResult<Vec<Participant>>;

    // Messages

    async fn insert_message(&self, caller: &Caller, message: Message) -> StoreResult<Message>;

    /// The newest `limit` messages, returned oldest first.
    async fn list_messages(
        &self,
        caller: &Caller,
        conversation_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Message>>;

    // Profiles

    async fn upsert_profile(&self, caller: &Caller, profile: Profile) -> StoreResult<Profile>;

    async fn get_profile(&self, caller: &Caller, user_id: UserId) -> StoreResult<Option<Profile>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_identity() {
        let id = Uuid::new_v4();

        assert_eq!(Caller::User(id).user_id(), Some(id));
        assert_eq!(Caller::Staff(id).user_id(), Some(id));
        assert_eq!(Caller::Service.user_id(), None);
        assert!(Caller::Staff(id).is_privileged());
        assert!(Caller::Service.is_privileged());
        assert!(!Caller::User(id).is_privileged());
        assert!(Caller::User(id).is(id));
        assert!(!Caller::Anonymous.is(id));
    }

    #[test]
    fn test_candidate_filter() {
        let author = Uuid::new_v4();
        let resource = Uuid::new_v4();
        let review = ModerationCandidate::new(author, ContentType::ResourceReview)
            .with_field("resource_id", resource);

        let filter = CandidateFilter::default()
            .content_type(ContentType::ResourceReview)
            .author(author)
            .field("resource_id", resource.to_string());
        assert!(filter.matches(&review));

        let other = CandidateFilter::default().status(ModerationStatus::Approved);
        assert!(!other.matches(&review));
    }

    #[test]
    fn test_chat_request_filter_between() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = ChatRequest::new(b, a, "hello");

        let filter = ChatRequestFilter::default()
            .status(ChatRequestStatus::Pending)
            .between(a, b);
        assert!(filter.matches(&request));
        assert!(!ChatRequestFilter::default().sender(a).matches(&request));
    }
}
