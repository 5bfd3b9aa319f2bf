//! Static profile score refresh.
//!
//! Recomputes `profile_score` for every complete profile on a fixed interval.
//! One profile failing is logged and counted; the pass carries on.

use super::{run_periodic, SingleFlight};
use crate::error::AppResult;
use crate::metrics;
use crate::services::ranking::static_score;
use crate::store::ProfileDirectory;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ScoringStats {
    pub started_at: Option<DateTime<Utc>>,
    pub profiles_seen: u32,
    pub profiles_updated: u32,
    pub profiles_failed: u32,
    /// Set when another pass was still running and this one did nothing.
    pub skipped: bool,
    pub total_duration_ms: u64,
}

pub struct ScoringJob {
    directory: Arc<dyn ProfileDirectory>,
    interval: Duration,
    flight: SingleFlight,
}

impl ScoringJob {
    pub fn new(directory: Arc<dyn ProfileDirectory>, interval: Duration) -> Self {
        Self {
            directory,
            interval,
            flight: SingleFlight::default(),
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let job = self.clone();
        run_periodic("profile-scoring", self.interval, shutdown, || {
            let job = job.clone();
            async move {
                if let Err(e) = job.run_once().await {
                    warn!(error = %e, "profile scoring pass failed");
                }
            }
        })
        .await;
    }

    pub async fn run_once(&self) -> AppResult<ScoringStats> {
        let Some(_permit) = self.flight.try_enter() else {
            warn!("profile scoring already running, skipping pass");
            return Ok(ScoringStats {
                skipped: true,
                ..Default::default()
            });
        };

        let started = Instant::now();
        let mut stats = ScoringStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let user_ids = self.directory.scoring_candidates().await?;
        for user_id in user_ids {
            stats.profiles_seen += 1;
            match self.score_one(user_id).await {
                Ok(true) => {
                    stats.profiles_updated += 1;
                    metrics::record_job_item("scoring", true);
                }
                Ok(false) => {}
                Err(e) => {
                    stats.profiles_failed += 1;
                    metrics::record_job_item("scoring", false);
                    warn!(user_id = %user_id, error = %e, "failed to update profile score");
                }
            }
        }

        stats.total_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            seen = stats.profiles_seen,
            updated = stats.profiles_updated,
            failed = stats.profiles_failed,
            duration_ms = stats.total_duration_ms,
            "profile scoring pass complete"
        );
        Ok(stats)
    }

    /// `Ok(false)` when the profile vanished or became incomplete mid-pass.
    async fn score_one(&self, user_id: Uuid) -> AppResult<bool> {
        let Some(inputs) = self.directory.score_inputs(user_id).await? else {
            return Ok(false);
        };
        let score = static_score(&inputs, Utc::now());
        self.directory.update_profile_score(user_id, score).await?;
        Ok(true)
    }
}
