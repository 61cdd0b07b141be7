//! Caller identity extractor.
//!
//! The upstream auth proxy authenticates the caller and forwards the user id
//! in the `x-user-id` header. Administrator checks happen in the services.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use rubuy_core::UserId;

use crate::error::set_sentry_user;

/// The HTTP header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the authenticated caller.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     format!("Hello, user {user}!")
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

/// Rejection when the identity header is missing or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRejection {
    Missing,
    Malformed,
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Missing => "missing user identity",
            Self::Malformed => "malformed user identity",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(IdentityRejection::Missing)?;
        let id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
            .ok_or(IdentityRejection::Malformed)?;

        let user = UserId::new(id);
        tracing::Span::current().record("user_id", id);
        set_sentry_user(&user);
        Ok(Self(user))
    }
}
