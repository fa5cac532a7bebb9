//! Reference-counted presence for an application session.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{PresenceChannel, PresenceError, PresenceRecord, PresenceTracker};

/// Owns one [`PresenceTracker`] shared by every view of a signed-in session.
///
/// The first `open` connects, the last `close` disconnects. Each holder
/// must pair its `open` with a `close`.
pub struct PresenceSession {
    tracker: PresenceTracker,
    holders: Mutex<usize>,
}

impl PresenceSession {
    pub fn new(channel: Arc<dyn PresenceChannel>, room: impl Into<String>) -> Self {
        Self {
            tracker: PresenceTracker::new(channel, room),
            holders: Mutex::new(0),
        }
    }

    /// Take a reference, connecting if this is the first.
    pub async fn open(&self, record: PresenceRecord) -> Result<(), PresenceError> {
        let mut holders = self.holders.lock().await;
        if *holders == 0 {
            self.tracker.connect(record).await?;
        }
        *holders += 1;
        debug!(room = self.tracker.room(), holders = *holders, "Presence session opened");
        Ok(())
    }

    /// Drop a reference, disconnecting when none remain.
    pub async fn close(&self) -> Result<(), PresenceError> {
        let mut holders = self.holders.lock().await;
        if *holders == 0 {
            return Ok(());
        }

        *holders -= 1;
        debug!(room = self.tracker.room(), holders = *holders, "Presence session closed");
        if *holders == 0 {
            self.tracker.disconnect().await?;
        }
        Ok(())
    }

    pub async fn holders(&self) -> usize {
        *self.holders.lock().await
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }
}
