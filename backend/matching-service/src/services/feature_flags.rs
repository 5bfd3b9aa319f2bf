//! Polled feature flags.
//!
//! Readers get a snapshot that is at most one refresh interval stale. A failed
//! refresh keeps the previous snapshot.

use crate::error::AppResult;
use crate::jobs::run_periodic;
use crate::store::FeatureFlagSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const RESTRICTIONS_ENABLED: &str = "restrictions_enabled";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagSnapshot {
    pub restrictions_enabled: bool,
}

#[derive(Clone)]
pub struct PolledFlags {
    source: Arc<dyn FeatureFlagSource>,
    restrictions_enabled: Arc<AtomicBool>,
    refresh_interval: Duration,
}

impl PolledFlags {
    /// Starts with every flag off until the first refresh lands.
    pub fn new(source: Arc<dyn FeatureFlagSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            restrictions_enabled: Arc::new(AtomicBool::new(false)),
            refresh_interval,
        }
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            restrictions_enabled: self.restrictions_enabled.load(Ordering::Acquire),
        }
    }

    pub async fn refresh(&self) -> AppResult<FlagSnapshot> {
        let flags = self.source.load_flags().await?;
        let enabled = flags.get(RESTRICTIONS_ENABLED).copied().unwrap_or(false);
        let previous = self.restrictions_enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::info!(restrictions_enabled = enabled, "feature flags changed");
        }
        Ok(self.snapshot())
    }

    pub fn spawn_refresher(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let flags = self.clone();
        tokio::spawn(async move {
            run_periodic("feature-flags", flags.refresh_interval, shutdown, || {
                let flags = flags.clone();
                async move {
                    if let Err(e) = flags.refresh().await {
                        tracing::warn!(error = %e, "feature flag refresh failed, keeping last snapshot");
                    }
                }
            })
            .await;
        })
    }
}
