//! Persistence seams. Stores hold data and enforce row-level atomicity only;
//! every policy decision lives in the services layer.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppResult;
use crate::models::{
    Conversation, ConversationOverview, Like, LikeEdges, Member, Message, MessageBody,
    PendingNotification, Presence, ProfileSummary,
};
use crate::services::discovery::CandidateFilter;
use crate::services::ranking::ScoreInputs;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>>;

    /// The conversation between two users, in either direction.
    async fn find_conversation_between(&self, a: Uuid, b: Uuid)
        -> AppResult<Option<Conversation>>;

    /// Create the conversation, both participant rows and the first message
    /// atomically. Fails with `Conflict` if the pair already has one.
    async fn create_conversation(
        &self,
        initiated_by: Uuid,
        recipient_id: Uuid,
        body: &MessageBody,
    ) -> AppResult<(Conversation, Message)>;

    /// Append a message and bump the conversation's `updated_at`.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> AppResult<Message>;

    /// Every conversation of `user_id`, most recently updated first.
    async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<ConversationOverview>>;

    /// Newest first.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>>;

    /// Set `read_at` on unread messages not authored by `reader_id`.
    /// Returns how many rows transitioned.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64>;

    /// Unread messages created before `older_than` that nobody has claimed yet.
    async fn pending_notifications(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PendingNotification>>;

    /// Set `notification_sent_at` if still unset. `false` means someone else
    /// already claimed it.
    async fn claim_notification(&self, message_id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Upsert presence. A new row takes `last_seen = at`; an existing row only
    /// moves `last_seen` when going offline.
    async fn upsert_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> AppResult<Presence>;

    async fn get_presence(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Presence>>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_member(&self, user_id: Uuid) -> AppResult<Option<Member>>;

    async fn profile_summaries(
        &self,
        user_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, ProfileSummary>>;

    /// Complete profiles other than `viewer_id` matching the static filters,
    /// each with its first image.
    async fn search_candidates(
        &self,
        viewer_id: Uuid,
        filter: &CandidateFilter,
    ) -> AppResult<Vec<(Member, Option<String>)>>;

    async fn like_edges(&self, viewer_id: Uuid) -> AppResult<LikeEdges>;

    /// Record `liker_id -> liked_id`. `None` when the edge already exists.
    async fn create_like(
        &self,
        liker_id: Uuid,
        liked_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Like>>;

    /// Users whose static score should be recomputed.
    async fn scoring_candidates(&self) -> AppResult<Vec<Uuid>>;

    async fn score_inputs(&self, user_id: Uuid) -> AppResult<Option<ScoreInputs>>;

    async fn update_profile_score(&self, user_id: Uuid, score: f64) -> AppResult<()>;
}

#[async_trait]
pub trait FeatureFlagSource: Send + Sync {
    async fn load_flags(&self) -> AppResult<HashMap<String, bool>>;
}
