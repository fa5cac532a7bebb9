//! Durable records shared by the community services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a signed-in user.
pub type UserId = Uuid;

/// State of a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ChatRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatRequestStatus::Pending)
    }
}

/// Answer given by the receiver of a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRequestDecision {
    Accepted,
    Rejected,
}

impl From<ChatRequestDecision> for ChatRequestStatus {
    fn from(decision: ChatRequestDecision) -> Self {
        match decision {
            ChatRequestDecision::Accepted => ChatRequestStatus::Accepted,
            ChatRequestDecision::Rejected => ChatRequestStatus::Rejected,
        }
    }
}

/// A request from one user to start a private conversation with another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Short introduction shown to the receiver
    pub message: String,
    pub status: ChatRequestStatus,
    /// Conversation provisioned on acceptance
    pub conversation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRequest {
    pub fn new(sender_id: UserId, receiver_id: UserId, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            message: message.into(),
            status: ChatRequestStatus::Pending,
            conversation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this request is between `a` and `b`, in either direction.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// Who is on the other side of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    /// One user and an AI companion
    Ai,
    /// Two users, provisioned by an accepted chat request
    Human,
}

/// Third-party read access to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Participants only
    #[default]
    Private,
    /// Participants and staff
    Shared,
    /// Anyone
    Public,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub visibility: Visibility,
    /// Companion persona, for AI conversations
    pub ai_agent_type: Option<String>,
    pub loss_type: Option<String>,
    pub worldview: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(kind: ConversationKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            visibility: Visibility::Private,
            ai_agent_type: None,
            loss_type: None,
            worldview: None,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Private two-party conversation.
    pub fn human() -> Self {
        Self::new(ConversationKind::Human)
    }

    /// Private companion conversation.
    pub fn companion(ai_agent_type: impl Into<String>) -> Self {
        let mut conversation = Self::new(ConversationKind::Ai);
        conversation.ai_agent_type = Some(ai_agent_type.into());
        conversation
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Membership of a user in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Author, absent for companion replies
    pub author_id: Option<UserId>,
    pub role: MessageRole,
    /// Sanitized HTML
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_user(conversation_id: Uuid, author_id: UserId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            author_id: Some(author_id),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn from_assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            author_id: None,
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Public-facing profile of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    /// Sanitized HTML
    pub bio: Option<String>,
    /// Kind of loss (parent, child, partner, ...)
    pub loss_type: Option<String>,
    pub worldview: Option<String>,
    pub avatar_url: Option<String>,
    /// Hidden from other members when set
    pub is_private: bool,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            bio: None,
            loss_type: None,
            worldview: None,
            avatar_url: None,
            is_private: false,
            updated_at: Utc::now(),
        }
    }
}
