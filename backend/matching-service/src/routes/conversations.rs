/// Conversation and message endpoints.
///
/// Every handler delegates policy to `ConversationGate`; these functions only
/// translate HTTP in and out.
use crate::error::AppError;
use crate::middleware::User;
use crate::models::{CreateConversationRequest, SendMessageRequest};
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// **Endpoint**: `POST /api/conversations`
#[post("/api/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: User,
    request: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let created = state
        .gate
        .create_conversation(user.id, request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(created))
}

/// Full inbox for viewers who can read messages, counts and teasers otherwise.
///
/// **Endpoint**: `GET /api/conversations/inbox`
#[get("/api/conversations/inbox")]
pub async fn get_inbox(state: web::Data<AppState>, user: User) -> Result<HttpResponse, AppError> {
    let inbox = state.gate.get_inbox(user.id).await?;
    Ok(HttpResponse::Ok().json(inbox))
}

/// **Endpoint**: `GET /api/conversations/{id}/messages?limit=&offset=`
#[get("/api/conversations/{conversation_id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    params: web::Query<HistoryParams>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .gate
        .get_messages(
            user.id,
            conversation_id.into_inner(),
            params.limit,
            params.offset,
        )
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// **Endpoint**: `POST /api/conversations/{id}/messages`
#[post("/api/conversations/{conversation_id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    request: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .gate
        .send_message(user.id, conversation_id.into_inner(), request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// **Endpoint**: `POST /api/conversations/{id}/read`
#[post("/api/conversations/{conversation_id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let marked = state
        .gate
        .mark_read(user.id, conversation_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "marked_read": marked })))
}

/// **Endpoint**: `GET /api/messages/unread-count`
#[get("/api/messages/unread-count")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let count = state.gate.unread_count(user.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "unread_count": count })))
}
