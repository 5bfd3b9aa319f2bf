mod common;

use actix_web::{test, web, App};
use common::member;
use matching_service::config::Config;
use matching_service::middleware::HmacTokenVerifier;
use matching_service::models::{Gender, WealthStatus};
use matching_service::routes;
use matching_service::services::feature_flags::RESTRICTIONS_ENABLED;
use matching_service::services::{
    ConversationGate, DiscoveryService, LikeService, PolledFlags, PresenceTracker,
};
use matching_service::state::AppState;
use matching_service::store::MemoryStore;
use matching_service::websocket::Hub;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SECRET: &str = "integration-test-secret";

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".into(),
        port: 0,
        hub_buffer_size: 16,
        flag_refresh_interval: Duration::from_secs(30),
        scoring_interval: Duration::from_secs(900),
        notification_scan_interval: Duration::from_secs(60),
        unread_notification_delay: Duration::from_secs(300),
        notification_webhook_url: None,
        auth_token_secret: SECRET.into(),
    }
}

async fn app_state(store: Arc<MemoryStore>) -> AppState {
    let flags = PolledFlags::new(store.clone(), Duration::from_secs(30));
    flags.refresh().await.unwrap();
    let hub = Hub::spawn(16);
    let presence = PresenceTracker::new(store.clone(), hub.clone());

    AppState {
        gate: Arc::new(ConversationGate::new(
            store.clone(),
            store.clone(),
            hub.clone(),
            presence.clone(),
            flags.clone(),
        )),
        discovery: Arc::new(DiscoveryService::new(store.clone(), presence.clone())),
        likes: Arc::new(LikeService::new(store, hub.clone(), flags)),
        presence,
        hub,
        auth: Arc::new(HmacTokenVerifier::new(SECRET)),
        config: Arc::new(test_config()),
    }
}

fn bearer(user_id: Uuid) -> (&'static str, String) {
    let token = HmacTokenVerifier::new(SECRET).issue(user_id).unwrap();
    ("Authorization", format!("Bearer {token}"))
}

#[actix_web::test]
async fn test_health_is_public() {
    let state = app_state(Arc::new(MemoryStore::new())).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_api_requires_valid_token() {
    let state = app_state(Arc::new(MemoryStore::new())).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/conversations/inbox")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/messages/unread-count")
        .insert_header(("Authorization", "Bearer forged.deadbeef"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");
}

#[actix_web::test]
async fn test_conversation_flow_over_http() {
    let store = Arc::new(MemoryStore::new());
    store.set_flag(RESTRICTIONS_ENABLED, true).await;
    let woman = member(Gender::Female, true, WealthStatus::None);
    let man = member(Gender::Male, true, WealthStatus::None);
    let (woman_id, man_id) = (woman.id(), man.id());
    store.add_member(woman).await;
    store.add_member(man).await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(store.clone()).await))
            .configure(routes::configure),
    )
    .await;

    // Men cannot open conversations.
    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(man_id))
        .set_json(json!({"recipient_id": woman_id, "content": "hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "male_cannot_initiate");

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(woman_id))
        .set_json(json!({"recipient_id": man_id, "message": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let conversation_id = body["conversation"]["id"].as_str().unwrap().to_string();

    // Locked inbox for the unsubscribed man.
    let req = test::TestRequest::get()
        .uri("/api/conversations/inbox")
        .insert_header(bearer(man_id))
        .to_request();
    let inbox: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(inbox["can_view_all_messages"], false);
    assert_eq!(inbox["locked_count"], 1);
    assert_eq!(inbox["locked_previews"][0]["teaser"], "hello…");

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conversation_id}/messages"))
        .insert_header(bearer(man_id))
        .set_json(json!({"content": "hey"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "subscription_required");

    let req = test::TestRequest::get()
        .uri("/api/messages/unread-count")
        .insert_header(bearer(man_id))
        .to_request();
    let unread: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(unread["unread_count"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conversation_id}/read"))
        .insert_header(bearer(man_id))
        .to_request();
    let marked: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(marked["marked_read"], 1);
}

#[actix_web::test]
async fn test_profile_search_over_http() {
    let store = Arc::new(MemoryStore::new());
    let viewer = member(Gender::Female, true, WealthStatus::None);
    let viewer_id = viewer.id();
    store.add_member(viewer).await;
    store
        .add_member(member(Gender::Male, true, WealthStatus::High))
        .await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(store).await))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/profiles?gender=male&limit=5")
        .insert_header(bearer(viewer_id))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 5);
    assert_eq!(page["profiles"][0]["wealth_status"], "high");

    let req = test::TestRequest::get()
        .uri("/api/profiles?min_age=50&max_age=20")
        .insert_header(bearer(viewer_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_like_over_http() {
    let store = Arc::new(MemoryStore::new());
    let liker = member(Gender::Female, true, WealthStatus::None);
    let liked = member(Gender::Male, true, WealthStatus::None);
    let (liker_id, liked_id) = (liker.id(), liked.id());
    store.add_member(liker).await;
    store.add_member(liked).await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(store).await))
            .configure(routes::configure),
    )
    .await;

    let uri = format!("/api/profiles/{liked_id}/like");
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(liker_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(liker_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["created"], false);
}
