use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub notification_sent_at: Option<DateTime<Utc>>,
}

/// Validated message payload: text, an image, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    content: String,
    image_url: Option<String>,
}

impl MessageBody {
    pub fn new(content: Option<String>, image_url: Option<String>) -> Result<Self, AppError> {
        let content = content.map(|c| c.trim().to_string()).unwrap_or_default();
        let image_url = image_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        if content.is_empty() && image_url.is_none() {
            return Err(AppError::Validation(
                "message must contain text or an image".into(),
            ));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        Ok(Self { content, image_url })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A message whose recipient should hear about it out-of-band.
#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub message: Message,
    pub recipient_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_requires_text_or_image() {
        assert!(MessageBody::new(None, None).is_err());
        assert!(MessageBody::new(Some("   ".into()), Some("".into())).is_err());

        let text = MessageBody::new(Some(" hi ".into()), None).expect("text");
        assert_eq!(text.content(), "hi");
        assert_eq!(text.image_url(), None);

        let image = MessageBody::new(None, Some("https://cdn/x.jpg".into())).expect("image");
        assert_eq!(image.content(), "");
        assert_eq!(image.image_url(), Some("https://cdn/x.jpg"));
    }

    #[test]
    fn test_body_length_limit_counts_chars() {
        let at_limit = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(MessageBody::new(Some(at_limit), None).is_ok());

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        let err = MessageBody::new(Some(over), None).expect_err("too long");
        assert_eq!(err.code(), "validation_error");
    }
}
