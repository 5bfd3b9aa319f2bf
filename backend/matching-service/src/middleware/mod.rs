pub mod auth;

pub use auth::{HmacTokenVerifier, TokenVerifier, User};
