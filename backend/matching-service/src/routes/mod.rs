pub mod conversations;
pub mod profiles;
pub mod wsroute;

use actix_web::{web, HttpResponse};

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Register every HTTP and WebSocket route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(wsroute::ws_handler)
        .service(conversations::create_conversation)
        .service(conversations::get_inbox)
        .service(conversations::get_messages)
        .service(conversations::send_message)
        .service(conversations::mark_read)
        .service(conversations::unread_count)
        .service(profiles::search_profiles)
        .service(profiles::like_profile)
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));
}
