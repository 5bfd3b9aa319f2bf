use crate::error::AppError;
use db_pool::env_utils::{parse_env_optional, parse_env_secs, parse_env_with_default};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// A periodic job interval; zero would spin the job loop.
fn job_interval(key: &str, default: Duration) -> Result<Duration, AppError> {
    let interval = parse_env_secs(key, default);
    if interval.is_zero() {
        return Err(AppError::Config(format!("{key} must be at least 1 second")));
    }
    Ok(interval)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Outbound frames buffered per live connection before it is evicted.
    pub hub_buffer_size: usize,
    pub flag_refresh_interval: Duration,
    pub scoring_interval: Duration,
    pub notification_scan_interval: Duration,
    /// How long a message must stay unread before the notifier picks it up.
    pub unread_notification_delay: Duration,
    pub notification_webhook_url: Option<String>,
    pub auth_token_secret: String,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HUB_BUFFER: usize = 256;

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let auth_token_secret = env::var("AUTH_TOKEN_SECRET")
            .map_err(|_| AppError::Config("AUTH_TOKEN_SECRET missing".into()))?;
        if auth_token_secret.len() < 16 {
            return Err(AppError::Config(
                "AUTH_TOKEN_SECRET must be at least 16 bytes".into(),
            ));
        }

        let hub_buffer_size =
            parse_env_with_default("HUB_BUFFER_SIZE", Self::DEFAULT_HUB_BUFFER).max(1);

        Ok(Self {
            database_url,
            port: parse_env_with_default("PORT", Self::DEFAULT_PORT),
            hub_buffer_size,
            flag_refresh_interval: job_interval(
                "FEATURE_FLAG_REFRESH_SECS",
                Duration::from_secs(30),
            )?,
            scoring_interval: job_interval("SCORING_INTERVAL_SECS", Duration::from_secs(15 * 60))?,
            notification_scan_interval: job_interval(
                "NOTIFICATION_SCAN_INTERVAL_SECS",
                Duration::from_secs(60),
            )?,
            unread_notification_delay: parse_env_secs(
                "UNREAD_NOTIFICATION_DELAY_SECS",
                Duration::from_secs(5 * 60),
            ),
            notification_webhook_url: parse_env_optional::<String>("NOTIFICATION_WEBHOOK_URL")
                .filter(|url| !url.trim().is_empty()),
            auth_token_secret,
        })
    }
}
