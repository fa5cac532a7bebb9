//! Community - the Solace grief-support community core
//!
//! Services over a managed relational store with row-level filtering:
//! - Content submissions, moderated through [`moderation::ModerationEngine`]
//! - A staff review queue for everything left pending
//! - The chat-request handshake that provisions two-party conversations
//! - Conversations and AI companion replies
//! - Realtime presence for the shared community room
//! - Member profiles
//!
//! # Architecture
//!
//! ```text
//!  SubmissionService ─► ModerationEngine ─► LlmBackend
//!        │                                     ▲
//!  ReviewQueue                          CompanionService
//!        │                                     │
//!        ▼                                     ▼
//!  ┌───────────────────────── Store ─────────────────────────┐
//!  │  candidates · chat_requests · conversations · messages  │
//!  │  participants · profiles         (row-level filtering)  │
//!  └─────────────────────────────────────────────────────────┘
//!        ▲                  ▲
//!  ChatRequestService  ConversationService
//!
//!  PresenceSession ─► PresenceTracker ─► PresenceChannel (PresenceHub)
//! ```
//!
//! Every service call takes the [`Caller`] it acts for; the store decides
//! which rows that caller can see or change.

pub mod chat_request;
pub mod config;
pub mod conversation;
pub mod error;
pub mod presence;
pub mod profile;
pub mod store;
pub mod submissions;
pub mod types;

pub use chat_request::{ChatRequestService, RespondOutcome};
pub use config::{ChatConfig, CommunityConfig, CompanionConfig, ConfigError, PresenceConfig};
pub use conversation::{CompanionReply, CompanionService, ConversationService, ConversationView};
pub use error::{CommunityError, ConflictKind, Result};
pub use presence::{
    PresenceChannel, PresenceError, PresenceEvent, PresenceHub, PresenceRecord, PresenceRegistry,
    PresenceSession, PresenceTracker, TrackerState,
};
pub use profile::ProfileService;
pub use store::{Caller, MemoryStore, Store, StoreError};
pub use submissions::{ReviewQueue, SubmissionDraft, SubmissionService};
pub use types::*;

use std::sync::Arc;

use moderation::{LlmBackend, ModerationEngine};

/// Every service wired to one store and one backend.
pub struct Community {
    pub submissions: SubmissionService,
    pub review: ReviewQueue,
    pub chat_requests: ChatRequestService,
    pub conversations: ConversationService,
    pub companion: CompanionService,
    pub profiles: ProfileService,
    pub presence: Arc<PresenceHub>,
    engine: Arc<ModerationEngine>,
    room: String,
}

impl Community {
    pub fn new(store: Arc<dyn Store>, backend: Arc<dyn LlmBackend>, config: CommunityConfig) -> Self {
        let engine = Arc::new(ModerationEngine::new(backend.clone(), config.moderation));

        Self {
            submissions: SubmissionService::new(store.clone(), engine.clone()),
            review: ReviewQueue::new(store.clone()),
            chat_requests: ChatRequestService::new(store.clone(), config.chat),
            conversations: ConversationService::new(store.clone()),
            companion: CompanionService::new(store.clone(), backend, config.companion),
            profiles: ProfileService::new(store),
            presence: Arc::new(PresenceHub::new(&config.presence)),
            engine,
            room: config.presence.room,
        }
    }

    /// A presence session in the shared community room, one per signed-in
    /// client.
    pub fn presence_session(&self) -> PresenceSession {
        PresenceSession::new(self.presence.clone(), self.room.clone())
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// The moderation engine, for its audit trail.
    pub fn engine(&self) -> &Arc<ModerationEngine> {
        &self.engine
    }
}
