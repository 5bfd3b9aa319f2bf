//! In-process store used by tests and local runs.
//!
//! A single lock around all state gives every operation the atomicity the
//! Postgres store gets from transactions. Timestamps are strictly increasing
//! so ordering by time is deterministic.

use super::{ConversationStore, FeatureFlagSource, PresenceStore, ProfileDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationOverview, Like, LikeEdges, Member, Message, MessageBody,
    PendingNotification, Presence, Profile, ProfileSummary, User,
};
use crate::services::discovery::CandidateFilter;
use crate::services::ranking::ScoreInputs;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    images: HashMap<Uuid, Vec<String>>,
    likes: Vec<Like>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
    presence: HashMap<Uuid, Presence>,
    flags: HashMap<String, bool>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Inner {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn member(&self, user_id: Uuid) -> Option<Member> {
        let user = self.users.get(&user_id)?;
        let profile = self.profiles.get(&user_id)?;
        Some(Member {
            user: user.clone(),
            profile: profile.clone(),
        })
    }

    fn first_image(&self, user_id: Uuid) -> Option<String> {
        self.images.get(&user_id).and_then(|v| v.first().cloned())
    }

    fn conversation_between(&self, a: Uuid, b: Uuid) -> Option<&Conversation> {
        self.conversations
            .values()
            .find(|c| c.is_participant(a) && c.is_participant(b))
    }

    fn new_message(
        &mut self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: body.content().to_string(),
            image_url: body.image_url().map(str::to_string),
            read_at: None,
            created_at: self.tick(),
            notification_sent_at: None,
        };
        self.messages.push(message.clone());
        message
    }

    fn is_unread_for(&self, message: &Message, user_id: Uuid) -> bool {
        message.sender_id != user_id
            && message.read_at.is_none()
            && self
                .conversations
                .get(&message.conversation_id)
                .map(|c| c.is_participant(user_id))
                .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, member: Member) {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(member.user.id, member.profile);
        inner.users.insert(member.user.id, member.user);
    }

    pub async fn update_user<F: FnOnce(&mut User)>(&self, user_id: Uuid, f: F) -> bool {
        let mut inner = self.inner.write().await;
        inner.users.get_mut(&user_id).map(f).is_some()
    }

    pub async fn update_profile<F: FnOnce(&mut Profile)>(&self, user_id: Uuid, f: F) -> bool {
        let mut inner = self.inner.write().await;
        inner.profiles.get_mut(&user_id).map(f).is_some()
    }

    pub async fn add_image(&self, user_id: Uuid, url: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.images.entry(user_id).or_default().push(url.into());
    }

    /// Returns `false` if the edge already existed.
    pub async fn add_like(&self, liker_id: Uuid, liked_id: Uuid) -> bool {
        matches!(
            self.create_like(liker_id, liked_id, Utc::now()).await,
            Ok(Some(_))
        )
    }

    pub async fn set_flag(&self, name: &str, enabled: bool) {
        self.inner
            .write()
            .await
            .flags
            .insert(name.to_string(), enabled);
    }

    pub async fn message(&self, message_id: Uuid) -> Option<Message> {
        let inner = self.inner.read().await;
        inner.messages.iter().find(|m| m.id == message_id).cloned()
    }

    pub async fn backdate_message(&self, message_id: Uuid, created_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(m) = inner.messages.iter_mut().find(|m| m.id == message_id) {
            m.created_at = created_at;
        }
    }

    pub async fn profile_score(&self, user_id: Uuid) -> Option<f64> {
        let inner = self.inner.read().await;
        inner.profiles.get(&user_id).map(|p| p.profile_score)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self
            .inner
            .read()
            .await
            .conversations
            .get(&conversation_id)
            .cloned())
    }

    async fn find_conversation_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.conversation_between(a, b).cloned())
    }

    async fn create_conversation(
        &self,
        initiated_by: Uuid,
        recipient_id: Uuid,
        body: &MessageBody,
    ) -> AppResult<(Conversation, Message)> {
        let mut inner = self.inner.write().await;
        if inner.conversation_between(initiated_by, recipient_id).is_some() {
            return Err(AppError::Conflict("conversation already exists".into()));
        }

        let created_at = inner.tick();
        let mut conversation = Conversation {
            id: Uuid::new_v4(),
            initiated_by,
            participants: [initiated_by, recipient_id],
            created_at,
            updated_at: created_at,
        };
        let message = inner.new_message(conversation.id, initiated_by, body);
        conversation.updated_at = message.created_at;
        inner
            .conversations
            .insert(conversation.id, conversation.clone());

        Ok((conversation, message))
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> AppResult<Message> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&conversation_id) {
            return Err(AppError::NotFound("conversation"));
        }
        let message = inner.new_message(conversation_id, sender_id, body);
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.updated_at = message.created_at;
        }
        Ok(message)
    }

    async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<ConversationOverview>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<ConversationOverview> = inner
            .conversations
            .values()
            .filter_map(|c| {
                let other_user_id = c.other_participant(user_id)?;
                let in_conversation = inner.messages.iter().filter(|m| m.conversation_id == c.id);
                let last_message = in_conversation
                    .clone()
                    .max_by_key(|m| m.created_at)
                    .cloned();
                let unread_count = in_conversation
                    .filter(|m| inner.is_unread_for(m, user_id))
                    .count() as i64;
                Some(ConversationOverview {
                    conversation: c.clone(),
                    other_user_id,
                    last_message,
                    unread_count,
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            b.conversation
                .updated_at
                .cmp(&a.conversation.updated_at)
                .then_with(|| a.conversation.id.cmp(&b.conversation.id))
        });
        Ok(rows)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let mut count = 0;
        for message in inner.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id && m.sender_id != reader_id && m.read_at.is_none()
        }) {
            message.read_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| inner.is_unread_for(m, user_id))
            .count() as i64)
    }

    async fn pending_notifications(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PendingNotification>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<PendingNotification> = inner
            .messages
            .iter()
            .filter(|m| {
                m.read_at.is_none()
                    && m.notification_sent_at.is_none()
                    && m.created_at <= older_than
            })
            .filter_map(|m| {
                let recipient_id = inner
                    .conversations
                    .get(&m.conversation_id)?
                    .other_participant(m.sender_id)?;
                Some(PendingNotification {
                    message: m.clone(),
                    recipient_id,
                })
            })
            .collect();
        pending.sort_by_key(|p| p.message.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn claim_notification(&self, message_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.messages.iter_mut().find(|m| m.id == message_id) {
            Some(m) if m.notification_sent_at.is_none() => {
                m.notification_sent_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn upsert_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> AppResult<Presence> {
        let mut inner = self.inner.write().await;
        let presence = inner
            .presence
            .entry(user_id)
            .and_modify(|p| {
                p.is_online = is_online;
                if !is_online {
                    p.last_seen = at;
                }
            })
            .or_insert(Presence {
                user_id,
                is_online,
                last_seen: at,
            });
        Ok(presence.clone())
    }

    async fn get_presence(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Presence>> {
        let inner = self.inner.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| inner.presence.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}

#[async_trait]
impl ProfileDirectory for MemoryStore {
    async fn get_member(&self, user_id: Uuid) -> AppResult<Option<Member>> {
        Ok(self.inner.read().await.member(user_id))
    }

    async fn profile_summaries(
        &self,
        user_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, ProfileSummary>> {
        let inner = self.inner.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| {
                let member = inner.member(*id)?;
                Some((
                    *id,
                    ProfileSummary {
                        user_id: *id,
                        display_name: member.user.display_name,
                        age: member.profile.age,
                        city: member.profile.city,
                        state: member.profile.state,
                        first_image: inner.first_image(*id),
                        is_verified: member.profile.person_verified,
                    },
                ))
            })
            .collect())
    }

    async fn search_candidates(
        &self,
        viewer_id: Uuid,
        filter: &CandidateFilter,
    ) -> AppResult<Vec<(Member, Option<String>)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .values()
            .filter(|p| p.user_id != viewer_id && p.is_complete)
            .filter_map(|p| inner.member(p.user_id))
            .filter(|m| filter.matches(m))
            .filter(|m| {
                !filter.online_only
                    || inner.presence.get(&m.id()).is_some_and(|p| p.is_online)
            })
            .map(|m| {
                let image = inner.first_image(m.id());
                (m, image)
            })
            .collect())
    }

    async fn like_edges(&self, viewer_id: Uuid) -> AppResult<LikeEdges> {
        let inner = self.inner.read().await;
        let mut edges = LikeEdges::default();
        for like in &inner.likes {
            if like.liker_id == viewer_id {
                edges.liked_by_viewer.insert(like.liked_id);
            }
            if like.liked_id == viewer_id {
                edges.liked_viewer.insert(like.liker_id);
            }
        }
        Ok(edges)
    }

    async fn create_like(
        &self,
        liker_id: Uuid,
        liked_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Like>> {
        let mut inner = self.inner.write().await;
        if inner
            .likes
            .iter()
            .any(|l| l.liker_id == liker_id && l.liked_id == liked_id)
        {
            return Ok(None);
        }
        let like = Like {
            liker_id,
            liked_id,
            created_at: at,
        };
        inner.likes.push(like.clone());
        Ok(Some(like))
    }

    async fn scoring_candidates(&self) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.read().await;
        let mut ids: Vec<Uuid> = inner
            .profiles
            .values()
            .filter(|p| p.is_complete)
            .map(|p| p.user_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn score_inputs(&self, user_id: Uuid) -> AppResult<Option<ScoreInputs>> {
        let inner = self.inner.read().await;
        let Some(member) = inner.member(user_id).filter(|m| m.profile.is_complete) else {
            return Ok(None);
        };

        let mut received: HashSet<Uuid> = HashSet::new();
        let mut replied: HashSet<Uuid> = HashSet::new();
        for conversation in inner.conversations.values().filter(|c| c.is_participant(user_id)) {
            let thread: Vec<&Message> = inner
                .messages
                .iter()
                .filter(|m| m.conversation_id == conversation.id)
                .collect();
            let first_incoming = thread
                .iter()
                .filter(|m| m.sender_id != user_id)
                .map(|m| m.created_at)
                .min();
            if let Some(first_incoming) = first_incoming {
                received.insert(conversation.id);
                if thread
                    .iter()
                    .any(|m| m.sender_id == user_id && m.created_at > first_incoming)
                {
                    replied.insert(conversation.id);
                }
            }
        }

        Ok(Some(ScoreInputs {
            email_verified: member.user.email_verified,
            person_verified: member.profile.person_verified,
            photo_count: inner.images.get(&user_id).map(|v| v.len()).unwrap_or(0) as u32,
            bio_len: member
                .profile
                .bio
                .as_deref()
                .map(|b| b.chars().count())
                .unwrap_or(0),
            has_salary_range: member
                .profile
                .salary_range
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty()),
            likes_received: inner.likes.iter().filter(|l| l.liked_id == user_id).count() as u32,
            conversations_received: received.len() as u32,
            conversations_replied: replied.len() as u32,
            created_at: member.user.created_at,
        }))
    }

    async fn update_profile_score(&self, user_id: Uuid, score: f64) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or(AppError::NotFound("profile"))?;
        profile.profile_score = score;
        Ok(())
    }
}

#[async_trait]
impl FeatureFlagSource for MemoryStore {
    async fn load_flags(&self) -> AppResult<HashMap<String, bool>> {
        Ok(self.inner.read().await.flags.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_seen_moves_only_when_going_offline() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let t0 = Utc::now();

        let first = store.upsert_presence(user, true, t0).await.unwrap();
        assert_eq!(first.last_seen, t0);

        let still_online = store
            .upsert_presence(user, true, t0 + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(still_online.last_seen, t0);

        let offline = store
            .upsert_presence(user, false, t0 + Duration::minutes(9))
            .await
            .unwrap();
        assert!(!offline.is_online);
        assert_eq!(offline.last_seen, t0 + Duration::minutes(9));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let body = MessageBody::new(Some("hey".into()), None).unwrap();
        let (_, message) = store.create_conversation(a, b, &body).await.unwrap();

        assert!(store.claim_notification(message.id, Utc::now()).await.unwrap());
        assert!(!store.claim_notification(message.id, Utc::now()).await.unwrap());
        assert!(store
            .pending_notifications(Utc::now() + Duration::hours(1), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_pair_conflicts_in_either_direction() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let body = MessageBody::new(Some("hi".into()), None).unwrap();
        store.create_conversation(a, b, &body).await.unwrap();

        let err = store.create_conversation(b, a, &body).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
    }
}
