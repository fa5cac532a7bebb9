//! Presence - who is online right now
//!
//! Presence is ephemeral: nothing here is persisted. A shared room is
//! carried by a [`PresenceChannel`]; each client keeps a local
//! [`PresenceRegistry`] patched from the channel's events.
//!
//! ```text
//!   PresenceSession (refcounted open/close)
//!          │
//!          ▼
//!   PresenceTracker ──track/untrack──► PresenceChannel (PresenceHub)
//!          ▲                                  │
//!          └──── Sync / Join / Leave ─────────┘
//!                 (pump task → PresenceRegistry)
//! ```
//!
//! A `Sync` event is authoritative and replaces whatever the registry held.

mod hub;
mod registry;
mod session;
mod tracker;

pub use hub::PresenceHub;
pub use registry::PresenceRegistry;
pub use session::PresenceSession;
pub use tracker::{PresenceTracker, TrackerState};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Profile, UserId};

/// What a connected member announces about themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub loss_type: Option<String>,
    pub worldview: Option<String>,
    pub avatar_url: Option<String>,
    pub online_at: DateTime<Utc>,
}

impl PresenceRecord {
    /// Presence for a profile, online as of now.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id,
            display_name: profile.display_name.clone(),
            loss_type: profile.loss_type.clone(),
            worldview: profile.worldview.clone(),
            avatar_url: profile.avatar_url.clone(),
            online_at: Utc::now(),
        }
    }
}

/// Change observed on a presence room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// Full room state
    Sync(Vec<PresenceRecord>),
    /// A member announced or re-announced
    Join(PresenceRecord),
    Leave(UserId),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PresenceError {
    #[error("Presence is not connected")]
    NotConnected,

    #[error("Announced user does not match the connected user")]
    IdentityMismatch,

    #[error("Presence channel error: {0}")]
    Channel(String),
}

/// A live subscription to a room.
pub struct PresenceSubscription {
    /// Room state when the subscription started
    pub initial: PresenceEvent,
    pub events: broadcast::Receiver<PresenceEvent>,
}

/// Realtime broadcast channel with presence semantics.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// Subscribe to a room. The subscription starts with a `Sync`.
    async fn subscribe(&self, room: &str) -> Result<PresenceSubscription, PresenceError>;

    /// Publish or overwrite a member's record.
    async fn track(&self, room: &str, record: PresenceRecord) -> Result<(), PresenceError>;

    /// Remove a member's record.
    async fn untrack(&self, room: &str, user_id: UserId) -> Result<(), PresenceError>;

    /// Current room state.
    async fn snapshot(&self, room: &str) -> Result<Vec<PresenceRecord>, PresenceError>;
}
