//! Directed likes. Each new edge notifies the liked user and later feeds the
//! mutual-interest bonus in search ranking.

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::services::feature_flags::PolledFlags;
use crate::store::ProfileDirectory;
use crate::websocket::message_types::{NotificationKind, NotificationPayload};
use crate::websocket::{Hub, WsOutboundEvent};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub liked_id: Uuid,
    /// `false` when the like already existed.
    pub created: bool,
}

pub struct LikeService {
    directory: Arc<dyn ProfileDirectory>,
    hub: Hub,
    flags: PolledFlags,
}

impl LikeService {
    pub fn new(directory: Arc<dyn ProfileDirectory>, hub: Hub, flags: PolledFlags) -> Self {
        Self {
            directory,
            hub,
            flags,
        }
    }

    pub async fn like_profile(&self, liker_id: Uuid, liked_id: Uuid) -> AppResult<LikeOutcome> {
        if liker_id == liked_id {
            return Err(AppError::Validation("cannot like your own profile".into()));
        }

        let liker = self
            .directory
            .get_member(liker_id)
            .await?
            .ok_or(AppError::NotFound("profile"))?;
        if self.directory.get_member(liked_id).await?.is_none() {
            return Err(AppError::NotFound("liked profile"));
        }

        if self.flags.snapshot().restrictions_enabled && !liker.profile.person_verified {
            metrics::record_rejection("like_profile", AppError::VerificationRequired.code());
            return Err(AppError::VerificationRequired);
        }

        let Some(like) = self
            .directory
            .create_like(liker_id, liked_id, Utc::now())
            .await?
        else {
            return Ok(LikeOutcome {
                liked_id,
                created: false,
            });
        };
        tracing::info!(liker_id = %like.liker_id, liked_id = %like.liked_id, "profile liked");

        let from_user_image = self
            .directory
            .profile_summaries(&[liker_id])
            .await?
            .remove(&liker_id)
            .and_then(|s| s.first_image);
        let event = WsOutboundEvent::Notification(NotificationPayload {
            kind: NotificationKind::Like,
            from_user_id: liker_id,
            from_user_name: liker.user.display_name,
            from_user_image,
        });
        self.hub.send_event(liked_id, &event).await;

        Ok(LikeOutcome {
            liked_id,
            created: true,
        })
    }
}
