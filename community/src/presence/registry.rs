use std::collections::HashMap;

use super::{PresenceEvent, PresenceRecord};
use crate::types::UserId;

/// Local view of a presence room.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    users: HashMap<UserId, PresenceRecord>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one channel event.
    pub fn apply(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::Sync(records) => {
                self.users = records.into_iter().map(|r| (r.user_id, r)).collect();
            }
            PresenceEvent::Join(record) => {
                self.users.insert(record.user_id, record);
            }
            PresenceEvent::Leave(user_id) => {
                self.users.remove(&user_id);
            }
        }
    }

    /// Online members, earliest first.
    pub fn current_users(&self) -> Vec<PresenceRecord> {
        let mut users: Vec<PresenceRecord> = self.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.online_at
                .cmp(&b.online_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
