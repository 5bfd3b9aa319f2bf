//! Unread-message notifier.
//!
//! Finds messages left unread past a delay and hands each to the external
//! notifier exactly once. A message is claimed (its `notification_sent_at`
//! set) before the notifier is called, so a rerun never picks it up again,
//! even if the previous send has not finished or failed.

use super::{run_periodic, SingleFlight};
use crate::error::AppResult;
use crate::metrics;
use crate::models::{teaser, PendingNotification};
use crate::services::notifier::{Notifier, UnreadNotice};
use crate::store::{ConversationStore, ProfileDirectory};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const BATCH_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationStats {
    pub found: u32,
    pub claimed: u32,
    pub sent: u32,
    pub failed: u32,
    pub skipped: bool,
}

pub struct UnreadNotificationJob {
    conversations: Arc<dyn ConversationStore>,
    directory: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn Notifier>,
    scan_interval: Duration,
    unread_delay: Duration,
    flight: SingleFlight,
}

impl UnreadNotificationJob {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        directory: Arc<dyn ProfileDirectory>,
        notifier: Arc<dyn Notifier>,
        scan_interval: Duration,
        unread_delay: Duration,
    ) -> Self {
        Self {
            conversations,
            directory,
            notifier,
            scan_interval,
            unread_delay,
            flight: SingleFlight::default(),
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let job = self.clone();
        run_periodic("unread-notifications", self.scan_interval, shutdown, || {
            let job = job.clone();
            async move {
                if let Err(e) = job.run_once().await {
                    warn!(error = %e, "unread notification scan failed");
                }
            }
        })
        .await;
    }

    pub async fn run_once(&self) -> AppResult<NotificationStats> {
        let Some(_permit) = self.flight.try_enter() else {
            warn!("unread notification scan already running, skipping pass");
            return Ok(NotificationStats {
                skipped: true,
                ..Default::default()
            });
        };

        let delay = chrono::Duration::from_std(self.unread_delay)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let cutoff = Utc::now() - delay;
        let pending = self
            .conversations
            .pending_notifications(cutoff, BATCH_LIMIT)
            .await?;

        let mut stats = NotificationStats {
            found: pending.len() as u32,
            ..Default::default()
        };

        for item in pending {
            let message_id = item.message.id;
            match self.conversations.claim_notification(message_id, Utc::now()).await {
                Ok(true) => stats.claimed += 1,
                Ok(false) => {
                    debug!(message_id = %message_id, "notification already claimed");
                    continue;
                }
                Err(e) => {
                    stats.failed += 1;
                    metrics::record_job_item("unread_notifications", false);
                    warn!(message_id = %message_id, error = %e, "failed to claim notification");
                    continue;
                }
            }

            let notice = self.build_notice(item).await;
            match self.notifier.notify_unread(&notice).await {
                Ok(()) => {
                    stats.sent += 1;
                    metrics::record_job_item("unread_notifications", true);
                }
                Err(e) => {
                    stats.failed += 1;
                    metrics::record_job_item("unread_notifications", false);
                    warn!(
                        message_id = %notice.message_id,
                        recipient_id = %notice.recipient_id,
                        error = %e,
                        "unread notification delivery failed"
                    );
                }
            }
        }

        if stats.found > 0 {
            info!(
                found = stats.found,
                claimed = stats.claimed,
                sent = stats.sent,
                failed = stats.failed,
                "unread notification scan complete"
            );
        }
        Ok(stats)
    }

    async fn build_notice(&self, item: PendingNotification) -> UnreadNotice {
        let sender_name = match self.directory.get_member(item.message.sender_id).await {
            Ok(member) => member.map(|m| m.user.display_name),
            Err(e) => {
                debug!(error = %e, "sender lookup failed, sending notice without name");
                None
            }
        };
        // Notices may reach users whose inbox is locked, so only the teaser goes out.
        let preview = teaser(&item.message.content);

        UnreadNotice {
            message_id: item.message.id,
            conversation_id: item.message.conversation_id,
            recipient_id: item.recipient_id,
            sender_id: item.message.sender_id,
            sender_name,
            preview,
            sent_at: item.message.created_at,
        }
    }
}
