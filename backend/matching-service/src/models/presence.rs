use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: Uuid,
    pub is_online: bool,
    /// Moves only when the user goes offline (or on first sighting).
    pub last_seen: DateTime<Utc>,
}
