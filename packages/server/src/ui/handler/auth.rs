//! Caller identity.
//!
//! Authentication happens upstream; HTTP callers arrive with their user id in
//! the `x-user-id` header.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::domain::UserId;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller of an HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("missing x-user-id header"))?
            .to_str()
            .map_err(|_| ApiError::bad_request("x-user-id header is not valid UTF-8"))?;
        let user_id = UserId::new(value.to_string())?;
        Ok(Caller(user_id))
    }
}
