//! Conversation access control.
//!
//! Decides who may open a conversation, who may send into one, and whether a
//! recipient gets a real-time push. Persistence always happens once the
//! sender passes; visibility only controls the push and the inbox shape.
//!
//! Every gender, verification and tier check is skipped while the
//! `restrictions_enabled` flag is off.

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    teaser, ConversationWithMessage, CreateConversationRequest, Gender, Inbox, InboxEntry,
    LockedPreview, Member, Message, MessageBody, SendMessageRequest, WealthStatus,
    LOCKED_PREVIEW_LIMIT,
};
use crate::services::feature_flags::PolledFlags;
use crate::services::presence::PresenceTracker;
use crate::store::{ConversationStore, ProfileDirectory};
use crate::websocket::message_types::{ReadReceiptPayload, TypingPayload};
use crate::websocket::{Hub, WsOutboundEvent};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct ConversationGate {
    conversations: Arc<dyn ConversationStore>,
    directory: Arc<dyn ProfileDirectory>,
    hub: Hub,
    presence: PresenceTracker,
    flags: PolledFlags,
}

impl ConversationGate {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        directory: Arc<dyn ProfileDirectory>,
        hub: Hub,
        presence: PresenceTracker,
        flags: PolledFlags,
    ) -> Self {
        Self {
            conversations,
            directory,
            hub,
            presence,
            flags,
        }
    }

    fn restrictions_enabled(&self) -> bool {
        self.flags.snapshot().restrictions_enabled
    }

    async fn member(&self, user_id: Uuid, what: &'static str) -> AppResult<Member> {
        self.directory
            .get_member(user_id)
            .await?
            .ok_or(AppError::NotFound(what))
    }

    fn reject(operation: &str, user_id: Uuid, err: AppError) -> AppError {
        metrics::record_rejection(operation, err.code());
        tracing::info!(user_id = %user_id, operation, code = err.code(), "gate rejected request");
        err
    }

    pub async fn create_conversation(
        &self,
        sender_id: Uuid,
        req: CreateConversationRequest,
    ) -> AppResult<ConversationWithMessage> {
        let body = MessageBody::new(req.content, req.image_url)?;
        if req.recipient_id == sender_id {
            return Err(AppError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let sender = self.member(sender_id, "sender profile").await?;
        let recipient = self.member(req.recipient_id, "recipient profile").await?;
        let restricted = self.restrictions_enabled();

        if restricted && sender.gender() == Gender::Male {
            return Err(Self::reject(
                "create_conversation",
                sender_id,
                AppError::MaleCannotInitiate,
            ));
        }

        if self
            .conversations
            .find_conversation_between(sender_id, req.recipient_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("conversation already exists".into()));
        }

        if restricted && !sender.profile.person_verified {
            return Err(Self::reject(
                "create_conversation",
                sender_id,
                AppError::VerificationRequired,
            ));
        }

        let (conversation, message) = self
            .conversations
            .create_conversation(sender_id, req.recipient_id, &body)
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            initiated_by = %sender_id,
            recipient_id = %req.recipient_id,
            "conversation created"
        );

        if !restricted || recipient.can_view_messages(Utc::now()) {
            self.hub
                .send_event(recipient.id(), &WsOutboundEvent::Message(message.clone()))
                .await;
        }

        Ok(ConversationWithMessage {
            conversation,
            message,
        })
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        req: SendMessageRequest,
    ) -> AppResult<Message> {
        let conversation = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        let recipient_id = conversation
            .other_participant(sender_id)
            .ok_or_else(|| Self::reject("send_message", sender_id, AppError::NotParticipant))?;

        let restricted = self.restrictions_enabled();
        if restricted {
            let sender = self.member(sender_id, "sender profile").await?;
            if !sender.profile.person_verified {
                return Err(Self::reject(
                    "send_message",
                    sender_id,
                    AppError::VerificationRequired,
                ));
            }
            if sender.gender() == Gender::Male
                && sender.wealth_status(Utc::now()) == WealthStatus::None
            {
                return Err(Self::reject(
                    "send_message",
                    sender_id,
                    AppError::WealthStatusRequired,
                ));
            }
        }

        let body = MessageBody::new(req.content, req.image_url)?;
        let message = self
            .conversations
            .append_message(conversation_id, sender_id, &body)
            .await?;

        if self.recipient_can_view(recipient_id, restricted).await {
            self.hub
                .send_event(recipient_id, &WsOutboundEvent::Message(message.clone()))
                .await;
        } else {
            tracing::debug!(
                recipient_id = %recipient_id,
                message_id = %message.id,
                "recipient locked, message filed without push"
            );
        }

        Ok(message)
    }

    async fn recipient_can_view(&self, recipient_id: Uuid, restricted: bool) -> bool {
        if !restricted {
            return true;
        }
        match self.directory.get_member(recipient_id).await {
            Ok(Some(member)) => member.can_view_messages(Utc::now()),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, recipient_id = %recipient_id, "visibility lookup failed");
                false
            }
        }
    }

    pub async fn get_inbox(&self, user_id: Uuid) -> AppResult<Inbox> {
        let can_view_all = if self.restrictions_enabled() {
            self.member(user_id, "profile")
                .await?
                .can_view_messages(Utc::now())
        } else {
            true
        };

        let overviews = self.conversations.list_conversations(user_id).await?;

        if can_view_all {
            let others: Vec<Uuid> = overviews.iter().map(|o| o.other_user_id).collect();
            let summaries = self.directory.profile_summaries(&others).await?;
            let online = self.presence.get_online_users(&others).await?;
            let conversations = overviews
                .into_iter()
                .map(|o| InboxEntry {
                    id: o.conversation.id,
                    other_user: summaries.get(&o.other_user_id).cloned(),
                    other_user_online: online.get(&o.other_user_id).copied().unwrap_or(false),
                    last_message: o.last_message,
                    unread_count: o.unread_count,
                    updated_at: o.conversation.updated_at,
                })
                .collect();

            return Ok(Inbox {
                conversations,
                locked_count: 0,
                locked_previews: None,
                can_view_all_messages: true,
            });
        }

        let locked_count = overviews.len() as i64;
        let shown: Vec<_> = overviews.into_iter().take(LOCKED_PREVIEW_LIMIT).collect();
        let others: Vec<Uuid> = shown.iter().map(|o| o.other_user_id).collect();
        let summaries = self.directory.profile_summaries(&others).await?;

        let previews = shown
            .into_iter()
            .map(|o| {
                let summary = summaries.get(&o.other_user_id);
                LockedPreview {
                    conversation_id: o.conversation.id,
                    first_image: summary.and_then(|s| s.first_image.clone()),
                    age: summary.and_then(|s| s.age),
                    city: summary.and_then(|s| s.city.clone()),
                    teaser: teaser(o.last_message.as_ref().map(|m| m.content.as_str()).unwrap_or("")),
                    updated_at: o.conversation.updated_at,
                }
            })
            .collect();

        Ok(Inbox {
            conversations: Vec::new(),
            locked_count,
            locked_previews: Some(previews),
            can_view_all_messages: false,
        })
    }

    /// Message history, newest first. Marks the other party's messages read.
    pub async fn get_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<Message>> {
        let conversation = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.is_participant(user_id) {
            return Err(Self::reject("get_messages", user_id, AppError::NotParticipant));
        }

        if self.restrictions_enabled()
            && !self
                .member(user_id, "profile")
                .await?
                .can_view_messages(Utc::now())
        {
            return Err(Self::reject(
                "get_messages",
                user_id,
                AppError::WealthStatusRequired,
            ));
        }

        let limit = match limit {
            Some(l) if (1..=MAX_PAGE_SIZE).contains(&l) => l,
            _ => DEFAULT_PAGE_SIZE,
        };
        let offset = offset.unwrap_or(0).max(0);

        self.mark_conversation_read(user_id, conversation_id, conversation.other_participant(user_id))
            .await?;

        self.conversations
            .list_messages(conversation_id, limit, offset)
            .await
    }

    /// Mark everything the other participant sent as read. Returns how many
    /// messages changed state; a repeat call returns 0.
    pub async fn mark_read(&self, user_id: Uuid, conversation_id: Uuid) -> AppResult<u64> {
        let conversation = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        let other = conversation
            .other_participant(user_id)
            .ok_or_else(|| Self::reject("mark_read", user_id, AppError::NotParticipant))?;

        self.mark_conversation_read(user_id, conversation_id, Some(other))
            .await
    }

    async fn mark_conversation_read(
        &self,
        reader_id: Uuid,
        conversation_id: Uuid,
        other: Option<Uuid>,
    ) -> AppResult<u64> {
        let count = self
            .conversations
            .mark_read(conversation_id, reader_id, Utc::now())
            .await?;

        if let (true, Some(other)) = (count > 0, other) {
            let receipt = WsOutboundEvent::ReadReceipt(ReadReceiptPayload {
                conversation_id,
                reader_id,
                count,
            });
            self.hub.send_event(other, &receipt).await;
        }
        Ok(count)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        self.conversations.unread_count(user_id).await
    }

    /// Forward a typing indicator to the other participant only.
    pub async fn relay_typing(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        is_typing: bool,
    ) -> AppResult<()> {
        let conversation = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        let other = conversation
            .other_participant(user_id)
            .ok_or(AppError::NotParticipant)?;

        let payload = TypingPayload {
            conversation_id,
            user_id,
        };
        let event = if is_typing {
            WsOutboundEvent::Typing(payload)
        } else {
            WsOutboundEvent::StopTyping(payload)
        };
        self.hub.send_event(other, &event).await;
        Ok(())
    }
}
