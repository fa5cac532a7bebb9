//! Client-side presence tracking for one member.

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{PresenceChannel, PresenceError, PresenceEvent, PresenceRecord, PresenceRegistry};
use crate::types::UserId;

/// Connection state of a [`PresenceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Disconnected,
    Subscribing,
    Subscribed,
}

struct Connection {
    user_id: UserId,
    pump: JoinHandle<()>,
}

struct Inner {
    state: TrackerState,
    connection: Option<Connection>,
}

/// Subscribes to a room, announces the member and keeps a live registry.
pub struct PresenceTracker {
    channel: Arc<dyn PresenceChannel>,
    room: String,
    registry: Arc<RwLock<PresenceRegistry>>,
    inner: Mutex<Inner>,
}

impl PresenceTracker {
    pub fn new(channel: Arc<dyn PresenceChannel>, room: impl Into<String>) -> Self {
        Self {
            channel,
            room: room.into(),
            registry: Arc::new(RwLock::new(PresenceRegistry::new())),
            inner: Mutex::new(Inner {
                state: TrackerState::Disconnected,
                connection: None,
            }),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub async fn state(&self) -> TrackerState {
        self.inner.lock().await.state
    }

    /// Subscribe to the room and announce `record`.
    ///
    /// Connecting while already connected re-announces.
    pub async fn connect(&self, record: PresenceRecord) -> Result<(), PresenceError> {
        let mut inner = self.inner.lock().await;

        if inner.state == TrackerState::Subscribed {
            return self.announce_locked(&mut inner, record).await;
        }

        inner.state = TrackerState::Subscribing;
        let subscription = match self.channel.subscribe(&self.room).await {
            Ok(subscription) => subscription,
            Err(e) => {
                inner.state = TrackerState::Disconnected;
                warn!(room = %self.room, error = %e, "Presence subscribe failed");
                return Err(e);
            }
        };

        self.registry.write().await.apply(subscription.initial);

        let pump = tokio::spawn(pump(
            subscription.events,
            self.channel.clone(),
            self.room.clone(),
            self.registry.clone(),
        ));

        inner.connection = Some(Connection {
            user_id: record.user_id,
            pump,
        });
        inner.state = TrackerState::Subscribed;
        info!(room = %self.room, user_id = %record.user_id, "Presence subscribed");

        self.announce_locked(&mut inner, record).await
    }

    /// Publish the member's record again, e.g. after a profile change.
    pub async fn announce(&self, record: PresenceRecord) -> Result<(), PresenceError> {
        let mut inner = self.inner.lock().await;
        self.announce_locked(&mut inner, record).await
    }

    async fn announce_locked(
        &self,
        inner: &mut Inner,
        record: PresenceRecord,
    ) -> Result<(), PresenceError> {
        let connection = inner.connection.as_ref().ok_or(PresenceError::NotConnected)?;
        if connection.user_id != record.user_id {
            return Err(PresenceError::IdentityMismatch);
        }

        // Local view reflects the announcement without waiting for the echo
        self.registry
            .write()
            .await
            .apply(PresenceEvent::Join(record.clone()));
        self.channel.track(&self.room, record).await
    }

    /// Leave the room. Untracks first so other members see the leave.
    pub async fn disconnect(&self) -> Result<(), PresenceError> {
        let mut inner = self.inner.lock().await;
        let Some(connection) = inner.connection.take() else {
            return Ok(());
        };

        let result = self.channel.untrack(&self.room, connection.user_id).await;
        if let Err(e) = &result {
            warn!(room = %self.room, error = %e, "Presence untrack failed");
        }

        connection.pump.abort();
        // Cancelled is the expected outcome
        let _ = connection.pump.await;
        self.registry.write().await.clear();
        inner.state = TrackerState::Disconnected;
        info!(room = %self.room, user_id = %connection.user_id, "Presence disconnected");

        result
    }

    /// Online members as currently known.
    pub async fn current_users(&self) -> Vec<PresenceRecord> {
        self.registry.read().await.current_users()
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(connection) = &self.inner.get_mut().connection {
            connection.pump.abort();
        }
    }
}

async fn pump(
    mut events: broadcast::Receiver<PresenceEvent>,
    channel: Arc<dyn PresenceChannel>,
    room: String,
    registry: Arc<RwLock<PresenceRegistry>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => registry.write().await.apply(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(room = %room, skipped = n, "Presence lagged; resyncing");
                match channel.snapshot(&room).await {
                    Ok(records) => registry.write().await.apply(PresenceEvent::Sync(records)),
                    Err(e) => warn!(room = %room, error = %e, "Presence resync failed"),
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(room = %room, "Presence channel closed");
                break;
            }
        }
    }
}
