use super::{Message, ProfileSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LOCKED_PREVIEW_LIMIT: usize = 5;
const TEASER_CHARS: usize = 10;
const EMPTY_TEASER: &str = "New message…";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub initiated_by: Uuid,
    /// Fixed at creation; never grows or shrinks.
    pub participants: [Uuid; 2],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConversationRequest {
    pub recipient_id: Uuid,
    #[serde(default, alias = "message")]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithMessage {
    pub conversation: Conversation,
    pub message: Message,
}

/// One row of a user's conversation list as the store returns it.
#[derive(Debug, Clone)]
pub struct ConversationOverview {
    pub conversation: Conversation,
    pub other_user_id: Uuid,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    pub id: Uuid,
    pub other_user: Option<ProfileSummary>,
    pub other_user_online: bool,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockedPreview {
    pub conversation_id: Uuid,
    pub first_image: Option<String>,
    pub age: Option<i32>,
    pub city: Option<String>,
    pub teaser: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
    pub conversations: Vec<InboxEntry>,
    pub locked_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_previews: Option<Vec<LockedPreview>>,
    pub can_view_all_messages: bool,
}

/// Blurred preview of a message body: the first few characters and an ellipsis.
pub fn teaser(content: &str) -> String {
    if content.is_empty() {
        return EMPTY_TEASER.to_string();
    }
    let mut out: String = content.chars().take(TEASER_CHARS).collect();
    out.push('…');
    out
}
