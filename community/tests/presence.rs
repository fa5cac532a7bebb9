//! Presence across several clients sharing one hub.

use std::sync::Arc;
use std::time::Duration;

use community::{
    PresenceChannel, PresenceHub, PresenceRecord, PresenceSession, PresenceTracker, Profile,
    TrackerState,
};
use uuid::Uuid;

const ROOM: &str = "community";

fn record(name: &str) -> PresenceRecord {
    let mut profile = Profile::new(Uuid::new_v4(), name);
    profile.loss_type = Some("partner".to_string());
    PresenceRecord::from_profile(&profile)
}

async fn wait_for_users(tracker: &PresenceTracker, expected: usize) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while tracker.current_users().await.len() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "expected {} online users", expected);
}

#[tokio::test]
async fn late_joiner_sees_existing_members() {
    let hub = Arc::new(PresenceHub::default());
    let ana = PresenceTracker::new(hub.clone(), ROOM);
    let ben = PresenceTracker::new(hub.clone(), ROOM);

    ana.connect(record("Ana")).await.unwrap();
    ben.connect(record("Ben")).await.unwrap();

    // Ben's initial sync already holds Ana
    assert_eq!(ben.current_users().await.len(), 2);
    wait_for_users(&ana, 2).await;
}

#[tokio::test]
async fn leave_is_observed_promptly() {
    let hub = Arc::new(PresenceHub::default());
    let ana = PresenceTracker::new(hub.clone(), ROOM);
    let ben = PresenceTracker::new(hub.clone(), ROOM);
    let ben_record = record("Ben");

    ana.connect(record("Ana")).await.unwrap();
    ben.connect(ben_record.clone()).await.unwrap();
    wait_for_users(&ana, 2).await;

    ben.disconnect().await.unwrap();
    wait_for_users(&ana, 1).await;
    assert!(ana
        .current_users()
        .await
        .iter()
        .all(|r| r.user_id != ben_record.user_id));
}

#[tokio::test]
async fn room_sync_converges_with_incremental_events() {
    let hub = Arc::new(PresenceHub::default());
    let ana = PresenceTracker::new(hub.clone(), ROOM);
    ana.connect(record("Ana")).await.unwrap();

    let ghost = record("Ghost");
    hub.track(ROOM, ghost.clone()).await.unwrap();
    wait_for_users(&ana, 2).await;

    hub.untrack(ROOM, ghost.user_id).await.unwrap();
    hub.broadcast_sync(ROOM);

    wait_for_users(&ana, 1).await;
}

#[tokio::test]
async fn session_is_shared_by_holders() {
    let hub = Arc::new(PresenceHub::default());
    let session = PresenceSession::new(hub.clone(), ROOM);
    let me = record("Ana");

    session.open(me.clone()).await.unwrap();
    session.open(me).await.unwrap();
    assert_eq!(hub.member_count(ROOM), 1);

    session.close().await.unwrap();
    assert_eq!(hub.member_count(ROOM), 1);
    session.close().await.unwrap();
    assert_eq!(hub.member_count(ROOM), 0);
    assert_eq!(session.tracker().state().await, TrackerState::Disconnected);
}

#[tokio::test]
async fn community_sessions_share_the_configured_room() {
    let mut config = community::CommunityConfig::default();
    config.presence.room = "lobby".to_string();
    let app = community::Community::new(
        Arc::new(community::MemoryStore::new()),
        Arc::new(moderation::backend::MockBackend::default()),
        config,
    );

    let ana = app.presence_session();
    let ben = app.presence_session();
    ana.open(record("Ana")).await.unwrap();
    ben.open(record("Ben")).await.unwrap();

    assert_eq!(app.room(), "lobby");
    assert_eq!(ana.tracker().room(), "lobby");
    assert_eq!(app.presence.member_count("lobby"), 2);
    wait_for_users(ana.tracker(), 2).await;

    ben.close().await.unwrap();
    wait_for_users(ana.tracker(), 1).await;
}
