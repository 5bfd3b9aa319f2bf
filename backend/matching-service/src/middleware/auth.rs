//! Bearer-token authentication.
//!
//! Tokens are `<user_uuid>.<hex hmac-sha256(user_uuid)>`. Issuing them is the
//! identity service's job; this service only verifies.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::{ready, Ready};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to the user it was issued for.
    fn verify(&self, token: &str) -> AppResult<Uuid>;
}

#[derive(Clone)]
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
}

impl HmacTokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, user_id: Uuid) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| {
            tracing::error!(error = %e, "invalid token secret");
            AppError::Internal
        })?;
        mac.update(user_id.to_string().as_bytes());
        Ok(mac)
    }

    /// Mint a token for `user_id`. Used by local tooling and tests.
    pub fn issue(&self, user_id: Uuid) -> AppResult<String> {
        let signature = self.mac(user_id)?.finalize().into_bytes();
        Ok(format!("{}.{}", user_id, hex::encode(signature)))
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> AppResult<Uuid> {
        let (user_part, signature_part) =
            token.split_once('.').ok_or(AppError::Unauthorized)?;
        let user_id = Uuid::parse_str(user_part).map_err(|_| AppError::Unauthorized)?;
        let signature = hex::decode(signature_part).map_err(|_| AppError::Unauthorized)?;

        // Constant-time comparison.
        self.mac(user_id)?
            .verify_slice(&signature)
            .map_err(|_| AppError::Unauthorized)?;
        Ok(user_id)
    }
}

/// Pull the raw token from `Authorization: Bearer ...` or `?token=...`.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string());

    from_header.or_else(|| {
        req.query_string().split('&').find_map(|pair| {
            pair.strip_prefix("token=")
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
    })
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = (|| -> AppResult<Self> {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or(AppError::Internal)?;
            let token = extract_token(req).ok_or(AppError::Unauthorized)?;
            let id = state.auth.verify(&token)?;
            Ok(User { id })
        })();
        ready(result)
    }
}
