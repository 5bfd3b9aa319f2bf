use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    /// Men cannot open a conversation while restrictions are enabled.
    #[error("male users cannot initiate conversations")]
    MaleCannotInitiate,

    #[error("identity verification is required")]
    VerificationRequired,

    #[error("an active subscription is required to send messages")]
    WealthStatusRequired,

    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<db_pool::DbPoolError> for AppError {
    fn from(e: db_pool::DbPoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl AppError {
    /// Machine-readable error kind sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::MaleCannotInitiate => "male_cannot_initiate",
            AppError::VerificationRequired => "person_verification_required",
            AppError::WealthStatusRequired => "subscription_required",
            AppError::NotParticipant => "not_a_participant",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Config(_) | AppError::Database(_) | AppError::Internal => "internal_error",
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::MaleCannotInitiate
            | AppError::VerificationRequired
            | AppError::WealthStatusRequired
            | AppError::NotParticipant => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Config(_) | AppError::Database(_) | AppError::Internal => 500,
        }
    }

    /// Expected policy rejections, as opposed to failures of the service itself.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            AppError::MaleCannotInitiate
                | AppError::VerificationRequired
                | AppError::WealthStatusRequired
                | AppError::NotParticipant
        )
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Config(_) | AppError::Database(_) => {
                AppError::Internal.to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() >= 500 {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(ResponseError::status_code(self)).json(ErrorBody {
            error: self.code(),
            message: self.public_message(),
            status: AppError::status_code(self),
        })
    }
}
