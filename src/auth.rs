//! Caller identity
//!
//! Authentication happens upstream; the fronting auth layer validates the
//! bearer token and injects the caller's id as `x-user-id`. This extractor
//! only lifts that header into a typed value so ownership checks stay
//! explicit in handlers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}
