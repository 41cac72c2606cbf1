//! Caller identity extractor.
//!
//! Authentication happens in front of this service; the gateway forwards
//! the authenticated user name in `x-sqlgate-user`.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

pub const CALLER_HEADER: &str = "x-sqlgate-user";

/// The authenticated user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AppError::Forbidden(format!("Missing or invalid {} header", CALLER_HEADER))
            })?;

        Ok(Caller(user.to_string()))
    }
}
