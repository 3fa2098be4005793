//! Caller identity extraction.

use axum::{extract::FromRequestParts, http::request::Parts};
use coursetrack_core::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user id, set by the session layer in
/// front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Rejects with 401 when the header is missing or
/// does not hold a valid user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .map(Caller)
            .ok_or(ApiError::Unauthorized)
    }
}
