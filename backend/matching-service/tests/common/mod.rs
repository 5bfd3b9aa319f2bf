#![allow(dead_code)]

use chrono::Utc;
use matching_service::models::{Gender, Member, Profile, User, WealthStatus};
use matching_service::services::feature_flags::RESTRICTIONS_ENABLED;
use matching_service::services::{ConversationGate, LikeService, PolledFlags, PresenceTracker};
use matching_service::store::MemoryStore;
use matching_service::websocket::{ClientConnection, Hub};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub hub: Hub,
    pub flags: PolledFlags,
    pub presence: PresenceTracker,
    pub gate: ConversationGate,
    pub likes: LikeService,
}

pub async fn harness(restricted: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.set_flag(RESTRICTIONS_ENABLED, restricted).await;

    let flags = PolledFlags::new(store.clone(), Duration::from_secs(30));
    flags.refresh().await.expect("flags load");

    let hub = Hub::spawn(16);
    let presence = PresenceTracker::new(store.clone(), hub.clone());
    let gate = ConversationGate::new(
        store.clone(),
        store.clone(),
        hub.clone(),
        presence.clone(),
        flags.clone(),
    );
    let likes = LikeService::new(store.clone(), hub.clone(), flags.clone());

    Harness {
        store,
        hub,
        flags,
        presence,
        gate,
        likes,
    }
}

pub fn member(gender: Gender, verified: bool, wealth: WealthStatus) -> Member {
    let id = Uuid::new_v4();
    Member {
        user: User {
            id,
            display_name: format!("user-{}", &id.to_string()[..8]),
            gender,
            email_verified: true,
            wealth_status: wealth,
            wealth_status_expires_at: None,
            created_at: Utc::now(),
        },
        profile: Profile {
            user_id: id,
            person_verified: verified,
            profile_score: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            is_complete: true,
            age: Some(30),
            city: Some("Austin".into()),
            state: Some("TX".into()),
            bio: None,
            salary_range: None,
        },
    }
}

impl Harness {
    pub async fn add(&self, gender: Gender, verified: bool, wealth: WealthStatus) -> Uuid {
        let m = member(gender, verified, wealth);
        let id = m.id();
        self.store.add_member(m).await;
        id
    }
}

/// Every frame currently queued for a connection, decoded.
pub fn drain(conn: &mut ClientConnection) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = conn.receiver.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("frame is json"));
    }
    frames
}
