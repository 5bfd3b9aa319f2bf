use crate::error::AppError;
use crate::middleware::User;
use crate::services::discovery::SearchQuery;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use uuid::Uuid;

/// Ranked profile search for the caller.
///
/// **Endpoint**: `GET /api/profiles?gender=&city=&state=&min_age=&max_age=&max_distance_km=&online_only=&page=&limit=`
#[get("/api/profiles")]
pub async fn search_profiles(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state.discovery.search(user.id, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// **Endpoint**: `POST /api/profiles/{user_id}/like`
///
/// 201 for a new like, 200 when it already existed.
#[post("/api/profiles/{user_id}/like")]
pub async fn like_profile(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let outcome = state.likes.like_profile(user.id, path.into_inner()).await?;
    if outcome.created {
        Ok(HttpResponse::Created().json(outcome))
    } else {
        Ok(HttpResponse::Ok().json(outcome))
    }
}
