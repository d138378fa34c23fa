use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const SESSION_HEADER: &str = "x-session-id";

/// Browsing session the cart and settlement slots belong to.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .ok_or(AppError::MissingSession)?;

        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(AppError::MissingSession);
        }
        Ok(SessionId(value.to_string()))
    }
}
