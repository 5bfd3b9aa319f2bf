use actix_web::{web, App, HttpServer};
use anyhow::Context;
use matching_service::{
    config::Config,
    db,
    jobs::{ScoringJob, UnreadNotificationJob},
    logging,
    middleware::HmacTokenVerifier,
    routes,
    services::{
        ConversationGate, DiscoveryService, LikeService, LogNotifier, Notifier, PolledFlags,
        PresenceTracker, WebhookNotifier,
    },
    state::AppState,
    store::PgStore,
    websocket::Hub,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url)
        .await
        .context("failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("failed to apply migrations")?;
    let store = Arc::new(PgStore::new(pool));

    let hub = Hub::spawn(cfg.hub_buffer_size);

    let flags = PolledFlags::new(store.clone(), cfg.flag_refresh_interval);
    if let Err(e) = flags.refresh().await {
        tracing::warn!(error = %e, "initial feature flag load failed, restrictions disabled");
    }

    let notifier: Arc<dyn Notifier> = match &cfg.notification_webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), WEBHOOK_TIMEOUT)
                .context("failed to build webhook notifier")?,
        ),
        None => Arc::new(LogNotifier),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flags_task = flags.spawn_refresher(shutdown_rx.clone());
    let scoring_task = tokio::spawn(
        Arc::new(ScoringJob::new(store.clone(), cfg.scoring_interval)).run(shutdown_rx.clone()),
    );
    let notification_task = tokio::spawn(
        Arc::new(UnreadNotificationJob::new(
            store.clone(),
            store.clone(),
            notifier,
            cfg.notification_scan_interval,
            cfg.unread_notification_delay,
        ))
        .run(shutdown_rx),
    );

    let presence = PresenceTracker::new(store.clone(), hub.clone());
    let state = AppState {
        gate: Arc::new(ConversationGate::new(
            store.clone(),
            store.clone(),
            hub.clone(),
            presence.clone(),
            flags.clone(),
        )),
        discovery: Arc::new(DiscoveryService::new(store.clone(), presence.clone())),
        likes: Arc::new(LikeService::new(store.clone(), hub.clone(), flags)),
        presence,
        hub,
        auth: Arc::new(HmacTokenVerifier::new(&cfg.auth_token_secret)),
        config: cfg.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting matching-service");

    let server = HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {bind_addr}"))?
    .run();

    let result = server.await;

    tracing::info!("http server stopped, shutting down background jobs");
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(flags_task, scoring_task, notification_task);

    result.context("http server failed")
}
