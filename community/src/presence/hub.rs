//! In-process presence channel.
//!
//! Each room keeps its members in a `DashMap` and fans events out over a
//! `tokio::sync::broadcast` channel. Subscribers that fall behind by more
//! than the channel capacity see `Lagged` and are expected to resync from
//! [`PresenceChannel::snapshot`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::{PresenceChannel, PresenceError, PresenceEvent, PresenceRecord, PresenceSubscription};
use crate::config::PresenceConfig;
use crate::types::UserId;

struct Room {
    members: DashMap<UserId, PresenceRecord>,
    sender: broadcast::Sender<PresenceEvent>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            members: DashMap::new(),
            sender,
        }
    }

    fn snapshot(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> =
            self.members.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| {
            a.online_at
                .cmp(&b.online_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        records
    }

    fn broadcast(&self, event: PresenceEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

/// Shared presence rooms for every client in this process.
pub struct PresenceHub {
    rooms: DashMap<String, Arc<Room>>,
    capacity: usize,
}

impl PresenceHub {
    pub fn new(config: &PresenceConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: config.channel_capacity.max(1),
        }
    }

    fn room(&self, name: &str) -> Arc<Room> {
        self.rooms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Room::new(self.capacity)))
            .clone()
    }

    /// Push the full room state to every subscriber.
    pub fn broadcast_sync(&self, room: &str) {
        let room = self.room(room);
        room.broadcast(PresenceEvent::Sync(room.snapshot()));
    }

    /// Number of members currently tracked in a room.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|r| r.members.len()).unwrap_or(0)
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|r| r.sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new(&PresenceConfig::default())
    }
}

#[async_trait]
impl PresenceChannel for PresenceHub {
    async fn subscribe(&self, room: &str) -> Result<PresenceSubscription, PresenceError> {
        let room_state = self.room(room);
        // Receiver first so nothing between the snapshot and the first recv is lost
        let events = room_state.sender.subscribe();
        let initial = PresenceEvent::Sync(room_state.snapshot());

        debug!(room = room, "Presence subscriber attached");
        Ok(PresenceSubscription { initial, events })
    }

    async fn track(&self, room: &str, record: PresenceRecord) -> Result<(), PresenceError> {
        let room = self.room(room);
        room.members.insert(record.user_id, record.clone());
        room.broadcast(PresenceEvent::Join(record));
        Ok(())
    }

    async fn untrack(&self, room: &str, user_id: UserId) -> Result<(), PresenceError> {
        let room = self.room(room);
        if room.members.remove(&user_id).is_some() {
            room.broadcast(PresenceEvent::Leave(user_id));
        }
        Ok(())
    }

    async fn snapshot(&self, room: &str) -> Result<Vec<PresenceRecord>, PresenceError> {
        Ok(self.room(room).snapshot())
    }
}
