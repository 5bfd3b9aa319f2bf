use crate::models::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: Uuid,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceiptPayload {
    pub conversation_id: Uuid,
    pub reader_id: Uuid,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub from_user_id: Uuid,
    pub from_user_name: String,
    pub from_user_image: Option<String>,
}

/// Outbound frames, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WsOutboundEvent {
    Message(Message),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
    ReadReceipt(ReadReceiptPayload),
    Notification(NotificationPayload),
    Presence(PresencePayload),
}

impl WsOutboundEvent {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound frames a client may send over its socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WsInboundEvent {
    Typing { conversation_id: Uuid },
    StopTyping { conversation_id: Uuid },
}
