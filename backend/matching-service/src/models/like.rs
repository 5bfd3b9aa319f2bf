use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Directed interest edge; unique per ordered (liker, liked) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub liker_id: Uuid,
    pub liked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Likes touching one viewer, split by direction.
#[derive(Debug, Clone, Default)]
pub struct LikeEdges {
    /// Users the viewer has liked.
    pub liked_by_viewer: HashSet<Uuid>,
    /// Users who have liked the viewer.
    pub liked_viewer: HashSet<Uuid>,
}
