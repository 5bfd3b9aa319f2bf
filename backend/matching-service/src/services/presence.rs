use crate::error::AppResult;
use crate::models::Presence;
use crate::store::PresenceStore;
use crate::websocket::message_types::PresencePayload;
use crate::websocket::{Hub, WsOutboundEvent};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const LOCK_STRIPES: usize = 64;

/// Online/offline bookkeeping. Every transition is broadcast to all clients.
///
/// Transitions for one user are serialized, and an offline transition only
/// happens while the hub holds no connection for that user. A session that
/// closes while a reconnect is in flight can therefore never leave a live
/// user stored as offline.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    hub: Hub,
    locks: Arc<Vec<Mutex<()>>>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn PresenceStore>, hub: Hub) -> Self {
        let locks = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Self {
            store,
            hub,
            locks: Arc::new(locks),
        }
    }

    fn lock_for(&self, user_id: Uuid) -> &Mutex<()> {
        &self.locks[(user_id.as_u128() % LOCK_STRIPES as u128) as usize]
    }

    pub async fn set_online(&self, user_id: Uuid) -> AppResult<Presence> {
        let _guard = self.lock_for(user_id).lock().await;
        self.transition(user_id, true).await
    }

    /// Unconditional offline transition.
    pub async fn set_offline(&self, user_id: Uuid) -> AppResult<Presence> {
        let _guard = self.lock_for(user_id).lock().await;
        self.transition(user_id, false).await
    }

    /// Offline transition for a closing session. Skipped when another
    /// connection for the user is registered; returns `None` in that case.
    pub async fn set_offline_if_disconnected(&self, user_id: Uuid) -> AppResult<Option<Presence>> {
        let _guard = self.lock_for(user_id).lock().await;
        if self.hub.is_online(user_id).await {
            tracing::debug!(user_id = %user_id, "user reconnected, keeping presence online");
            return Ok(None);
        }
        self.transition(user_id, false).await.map(Some)
    }

    async fn transition(&self, user_id: Uuid, is_online: bool) -> AppResult<Presence> {
        let presence = self
            .store
            .upsert_presence(user_id, is_online, Utc::now())
            .await?;
        tracing::debug!(user_id = %user_id, is_online, "presence updated");

        self.hub
            .broadcast_event(&WsOutboundEvent::Presence(PresencePayload {
                user_id,
                is_online,
            }));
        Ok(presence)
    }

    /// Presence rows for the given users. Users without a row are absent.
    pub async fn lookup(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Presence>> {
        self.store.get_presence(user_ids).await
    }

    /// Batch lookup; users with no presence row are reported offline.
    pub async fn get_online_users(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, bool>> {
        let rows = self.store.get_presence(user_ids).await?;
        Ok(user_ids
            .iter()
            .map(|id| (*id, rows.get(id).map(|p| p.is_online).unwrap_or(false)))
            .collect())
    }
}
