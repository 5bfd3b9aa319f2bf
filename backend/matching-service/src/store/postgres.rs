use super::{ConversationStore, FeatureFlagSource, PresenceStore, ProfileDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationOverview, Gender, Like, LikeEdges, Member, Message, MessageBody,
    PendingNotification, Presence, Profile, ProfileSummary, User, WealthStatus,
};
use crate::services::discovery::CandidateFilter;
use crate::services::ranking::{ScoreInputs, UNSET_DISTANCE_KM};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::HashMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str =
    "c.id, c.initiated_by, c.user_low, c.user_high, c.created_at, c.updated_at";

const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.sender_id, m.content, m.image_url, \
     m.read_at, m.created_at, m.notification_sent_at";

const MEMBER_COLUMNS: &str = "u.id, u.display_name, u.gender, u.email_verified, u.wealth_status, \
     u.wealth_status_expires_at, u.created_at, p.person_verified, p.profile_score, p.latitude, \
     p.longitude, p.is_complete, p.age, p.city, p.state, p.bio, p.salary_range";

const FIRST_IMAGE: &str = "(SELECT i.url FROM profile_images i WHERE i.user_id = u.id \
     ORDER BY i.position, i.created_at LIMIT 1) AS first_image";

type SqlParams = Vec<Box<dyn ToSql + Sync + Send>>;

/// Search SQL with every filter in the WHERE clause. Ranking needs live
/// presence and like data, so the full matching set is returned.
fn candidate_query(viewer_id: Uuid, filter: &CandidateFilter) -> (String, SqlParams) {
    let mut sql = format!(
        "SELECT {MEMBER_COLUMNS}, {FIRST_IMAGE}
         FROM users u
         JOIN profiles p ON p.user_id = u.id
         WHERE u.id <> $1 AND p.is_complete"
    );
    let mut params: SqlParams = vec![Box::new(viewer_id)];

    if let Some(gender) = filter.gender {
        params.push(Box::new(gender.as_str().to_string()));
        sql.push_str(&format!(" AND u.gender = ${}", params.len()));
    }
    if let Some(city) = &filter.city {
        params.push(Box::new(format!("%{}%", escape_like(city))));
        sql.push_str(&format!(" AND LOWER(p.city) LIKE ${}", params.len()));
    }
    if let Some(state) = &filter.state {
        params.push(Box::new(format!("%{}%", escape_like(state))));
        sql.push_str(&format!(" AND LOWER(p.state) LIKE ${}", params.len()));
    }
    if let Some(min_age) = filter.min_age {
        params.push(Box::new(min_age));
        sql.push_str(&format!(" AND p.age >= ${}", params.len()));
    }
    if let Some(max_age) = filter.max_age {
        params.push(Box::new(max_age));
        sql.push_str(&format!(" AND p.age <= ${}", params.len()));
    }
    if let Some(near) = filter.near {
        params.push(Box::new(near.latitude));
        let lat = params.len();
        params.push(Box::new(near.longitude));
        let lng = params.len();
        params.push(Box::new(near.max_km));
        let max = params.len();
        sql.push_str(&format!(
            " AND (CASE WHEN p.latitude = 0 AND p.longitude = 0 THEN {UNSET_DISTANCE_KM}::float8
                   ELSE 6371.0 * 2 * ASIN(SQRT(LEAST(1.0,
                        POWER(SIN(RADIANS(p.latitude - ${lat}) / 2), 2)
                        + COS(RADIANS(${lat})) * COS(RADIANS(p.latitude))
                          * POWER(SIN(RADIANS(p.longitude - ${lng}) / 2), 2))))
                   END) <= ${max}"
        ));
    }
    if filter.online_only {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM user_presence up
                          WHERE up.user_id = u.id AND up.is_online)",
        );
    }
    sql.push_str(" ORDER BY p.profile_score DESC, u.id");
    (sql, params)
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn conversation_from_row(row: &Row) -> Conversation {
    let initiated_by: Uuid = row.get("initiated_by");
    let low: Uuid = row.get("user_low");
    let high: Uuid = row.get("user_high");
    let other = if low == initiated_by { high } else { low };
    Conversation {
        id: row.get("id"),
        initiated_by,
        participants: [initiated_by, other],
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        image_url: row.get("image_url"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
        notification_sent_at: row.get("notification_sent_at"),
    }
}

fn member_from_row(row: &Row) -> AppResult<Member> {
    let id: Uuid = row.get("id");
    let gender: String = row.get("gender");
    let gender: Gender = gender
        .parse()
        .map_err(|e: String| AppError::Database(format!("user {id}: {e}")))?;
    let wealth: String = row.get("wealth_status");

    Ok(Member {
        user: User {
            id,
            display_name: row.get("display_name"),
            gender,
            email_verified: row.get("email_verified"),
            wealth_status: WealthStatus::from_db(&wealth),
            wealth_status_expires_at: row.get("wealth_status_expires_at"),
            created_at: row.get("created_at"),
        },
        profile: Profile {
            user_id: id,
            person_verified: row.get("person_verified"),
            profile_score: row.get("profile_score"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            is_complete: row.get("is_complete"),
            age: row.get("age"),
            city: row.get("city"),
            state: row.get("state"),
            bio: row.get("bio"),
            salary_range: row.get("salary_range"),
        },
    })
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = $1"),
                &[&conversation_id],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn find_conversation_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let (low, high) = ordered_pair(a, b);
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
                     WHERE c.user_low = $1 AND c.user_high = $2"
                ),
                &[&low, &high],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn create_conversation(
        &self,
        initiated_by: Uuid,
        recipient_id: Uuid,
        body: &MessageBody,
    ) -> AppResult<(Conversation, Message)> {
        let (low, high) = ordered_pair(initiated_by, recipient_id);
        let conversation_id = Uuid::new_v4();
        let message_id = Uuid::new_v4();
        let content = body.content();
        let image_url = body.image_url();

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let inserted = tx
            .query_opt(
                "INSERT INTO conversations (id, initiated_by, user_low, user_high, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, NOW(), NOW())
                 ON CONFLICT (user_low, user_high) DO NOTHING
                 RETURNING id",
                &[&conversation_id, &initiated_by, &low, &high],
            )
            .await?;
        if inserted.is_none() {
            return Err(AppError::Conflict("conversation already exists".into()));
        }

        tx.execute(
            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2), ($1, $3)",
            &[&conversation_id, &initiated_by, &recipient_id],
        )
        .await?;

        let message_row = tx
            .query_one(
                "INSERT INTO messages (id, conversation_id, sender_id, content, image_url)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, conversation_id, sender_id, content, image_url, read_at,
                           created_at, notification_sent_at",
                &[&message_id, &conversation_id, &initiated_by, &content, &image_url],
            )
            .await?;
        let message = message_from_row(&message_row);

        let conversation_row = tx
            .query_one(
                &format!(
                    "UPDATE conversations c SET updated_at = $2 WHERE c.id = $1 \
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                &[&conversation_id, &message.created_at],
            )
            .await?;

        tx.commit().await?;
        Ok((conversation_from_row(&conversation_row), message))
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> AppResult<Message> {
        let message_id = Uuid::new_v4();
        let content = body.content();
        let image_url = body.image_url();

        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "WITH inserted AS (
                     INSERT INTO messages (id, conversation_id, sender_id, content, image_url)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING id, conversation_id, sender_id, content, image_url, read_at,
                               created_at, notification_sent_at
                 ), bumped AS (
                     UPDATE conversations SET updated_at = (SELECT created_at FROM inserted)
                     WHERE id = $2
                 )
                 SELECT * FROM inserted",
                &[&message_id, &conversation_id, &sender_id, &content, &image_url],
            )
            .await?;
        Ok(message_from_row(&row))
    }

    async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<ConversationOverview>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS},
                            lm.id AS m_id, lm.sender_id AS m_sender_id, lm.content AS m_content,
                            lm.image_url AS m_image_url, lm.read_at AS m_read_at,
                            lm.created_at AS m_created_at,
                            lm.notification_sent_at AS m_notification_sent_at,
                            (SELECT COUNT(*) FROM messages un
                              WHERE un.conversation_id = c.id
                                AND un.sender_id <> $1
                                AND un.read_at IS NULL) AS unread_count
                     FROM conversations c
                     JOIN conversation_participants cp
                       ON cp.conversation_id = c.id AND cp.user_id = $1
                     LEFT JOIN LATERAL (
                         SELECT * FROM messages m
                         WHERE m.conversation_id = c.id
                         ORDER BY m.created_at DESC
                         LIMIT 1
                     ) lm ON TRUE
                     ORDER BY c.updated_at DESC, c.id"
                ),
                &[&user_id],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let conversation = conversation_from_row(row);
                let other_user_id = conversation.other_participant(user_id)?;
                let last_message = row.get::<_, Option<Uuid>>("m_id").map(|id| Message {
                    id,
                    conversation_id: conversation.id,
                    sender_id: row.get("m_sender_id"),
                    content: row.get("m_content"),
                    image_url: row.get("m_image_url"),
                    read_at: row.get("m_read_at"),
                    created_at: row.get("m_created_at"),
                    notification_sent_at: row.get("m_notification_sent_at"),
                });
                Some(ConversationOverview {
                    conversation,
                    other_user_id,
                    last_message,
                    unread_count: row.get("unread_count"),
                })
            })
            .collect())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     WHERE m.conversation_id = $1
                     ORDER BY m.created_at DESC
                     LIMIT $2 OFFSET $3"
                ),
                &[&conversation_id, &limit, &offset],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET read_at = $3
                 WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL",
                &[&conversation_id, &reader_id, &at],
            )
            .await?;
        Ok(updated)
    }

    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversation_participants cp
                   ON cp.conversation_id = m.conversation_id AND cp.user_id = $1
                 WHERE m.sender_id <> $1 AND m.read_at IS NULL",
                &[&user_id],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn pending_notifications(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PendingNotification>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS}, cp.user_id AS recipient_id
                     FROM messages m
                     JOIN conversation_participants cp
                       ON cp.conversation_id = m.conversation_id AND cp.user_id <> m.sender_id
                     WHERE m.read_at IS NULL
                       AND m.notification_sent_at IS NULL
                       AND m.created_at <= $1
                     ORDER BY m.created_at
                     LIMIT $2"
                ),
                &[&older_than, &limit],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| PendingNotification {
                message: message_from_row(row),
                recipient_id: row.get("recipient_id"),
            })
            .collect())
    }

    async fn claim_notification(&self, message_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET notification_sent_at = $2
                 WHERE id = $1 AND notification_sent_at IS NULL",
                &[&message_id, &at],
            )
            .await?;
        Ok(updated == 1)
    }
}

#[async_trait]
impl PresenceStore for PgStore {
    async fn upsert_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> AppResult<Presence> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO user_presence (user_id, is_online, last_seen)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     is_online = EXCLUDED.is_online,
                     last_seen = CASE WHEN EXCLUDED.is_online
                                      THEN user_presence.last_seen
                                      ELSE EXCLUDED.last_seen END
                 RETURNING user_id, is_online, last_seen",
                &[&user_id, &is_online, &at],
            )
            .await?;
        Ok(Presence {
            user_id: row.get("user_id"),
            is_online: row.get("is_online"),
            last_seen: row.get("last_seen"),
        })
    }

    async fn get_presence(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Presence>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT user_id, is_online, last_seen FROM user_presence WHERE user_id = ANY($1)",
                &[&user_ids],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let presence = Presence {
                    user_id: row.get("user_id"),
                    is_online: row.get("is_online"),
                    last_seen: row.get("last_seen"),
                };
                (presence.user_id, presence)
            })
            .collect())
    }
}

#[async_trait]
impl ProfileDirectory for PgStore {
    async fn get_member(&self, user_id: Uuid) -> AppResult<Option<Member>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM users u
                     JOIN profiles p ON p.user_id = u.id
                     WHERE u.id = $1"
                ),
                &[&user_id],
            )
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn profile_summaries(
        &self,
        user_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, ProfileSummary>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT u.id, u.display_name, p.age, p.city, p.state, p.person_verified,
                            {FIRST_IMAGE}
                     FROM users u
                     JOIN profiles p ON p.user_id = u.id
                     WHERE u.id = ANY($1)"
                ),
                &[&user_ids],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let summary = ProfileSummary {
                    user_id: row.get("id"),
                    display_name: row.get("display_name"),
                    age: row.get("age"),
                    city: row.get("city"),
                    state: row.get("state"),
                    first_image: row.get("first_image"),
                    is_verified: row.get("person_verified"),
                };
                (summary.user_id, summary)
            })
            .collect())
    }

    async fn search_candidates(
        &self,
        viewer_id: Uuid,
        filter: &CandidateFilter,
    ) -> AppResult<Vec<(Member, Option<String>)>> {
        let (sql, params) = candidate_query(viewer_id, filter);
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &refs).await?;
        rows.iter()
            .map(|row| Ok((member_from_row(row)?, row.get("first_image"))))
            .collect()
    }

    async fn like_edges(&self, viewer_id: Uuid) -> AppResult<LikeEdges> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT liker_id, liked_id FROM likes WHERE liker_id = $1 OR liked_id = $1",
                &[&viewer_id],
            )
            .await?;

        let mut edges = LikeEdges::default();
        for row in rows {
            let liker: Uuid = row.get("liker_id");
            let liked: Uuid = row.get("liked_id");
            if liker == viewer_id {
                edges.liked_by_viewer.insert(liked);
            }
            if liked == viewer_id {
                edges.liked_viewer.insert(liker);
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
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "INSERT INTO likes (liker_id, liked_id, created_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (liker_id, liked_id) DO NOTHING
                 RETURNING liker_id, liked_id, created_at",
                &[&liker_id, &liked_id, &at],
            )
            .await?;
        Ok(row.map(|row| Like {
            liker_id: row.get("liker_id"),
            liked_id: row.get("liked_id"),
            created_at: row.get("created_at"),
        }))
    }

    async fn scoring_candidates(&self) -> AppResult<Vec<Uuid>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT user_id FROM profiles WHERE is_complete ORDER BY user_id",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }

    async fn score_inputs(&self, user_id: Uuid) -> AppResult<Option<ScoreInputs>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT u.email_verified,
                        p.person_verified,
                        COALESCE(char_length(p.bio), 0)::BIGINT AS bio_len,
                        (p.salary_range IS NOT NULL AND p.salary_range <> '') AS has_salary,
                        u.created_at,
                        (SELECT COUNT(*) FROM profile_images i WHERE i.user_id = u.id) AS photo_count,
                        (SELECT COUNT(*) FROM likes l WHERE l.liked_id = u.id) AS likes_received,
                        (SELECT COUNT(DISTINCT cp.conversation_id)
                           FROM conversation_participants cp
                           JOIN messages m
                             ON m.conversation_id = cp.conversation_id AND m.sender_id <> cp.user_id
                          WHERE cp.user_id = u.id) AS received,
                        (SELECT COUNT(DISTINCT m.conversation_id)
                           FROM messages m
                          WHERE m.sender_id = u.id
                            AND EXISTS (
                                SELECT 1 FROM messages m2
                                 WHERE m2.conversation_id = m.conversation_id
                                   AND m2.sender_id <> u.id
                                   AND m2.created_at < m.created_at)) AS replied
                 FROM users u
                 JOIN profiles p ON p.user_id = u.id
                 WHERE u.id = $1 AND p.is_complete",
                &[&user_id],
            )
            .await?;

        Ok(row.map(|row| ScoreInputs {
            email_verified: row.get("email_verified"),
            person_verified: row.get("person_verified"),
            photo_count: row.get::<_, i64>("photo_count") as u32,
            bio_len: row.get::<_, i64>("bio_len") as usize,
            has_salary_range: row.get("has_salary"),
            likes_received: row.get::<_, i64>("likes_received") as u32,
            conversations_received: row.get::<_, i64>("received") as u32,
            conversations_replied: row.get::<_, i64>("replied") as u32,
            created_at: row.get("created_at"),
        }))
    }

    async fn update_profile_score(&self, user_id: Uuid, score: f64) -> AppResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE profiles SET profile_score = $2 WHERE user_id = $1",
                &[&user_id, &score],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("profile"));
        }
        Ok(())
    }
}

#[async_trait]
impl FeatureFlagSource for PgStore {
    async fn load_flags(&self) -> AppResult<HashMap<String, bool>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT name, enabled FROM feature_flags", &[])
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("name"), row.get("enabled")))
            .collect())
    }
}
