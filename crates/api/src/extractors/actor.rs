//! Actor identity extractor.
//!
//! The report engine does not authenticate callers. An upstream gateway
//! passes the caller's id in the `X-Actor-Id` header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Optional caller identity. Absent header means an anonymous caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actor(pub Option<Uuid>);

impl Actor {
    pub fn id(&self) -> Option<Uuid> {
        self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(Actor(None));
        };

        let value = value
            .to_str()
            .map_err(|_| ApiError::Validation("X-Actor-Id header is not valid text".to_string()))?
            .trim();
        if value.is_empty() {
            return Ok(Actor(None));
        }

        Uuid::parse_str(value)
            .map(|id| Actor(Some(id)))
            .map_err(|_| ApiError::Validation("X-Actor-Id header must be a UUID".to_string()))
    }
}
