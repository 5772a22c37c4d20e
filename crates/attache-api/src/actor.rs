//! Caller identity.
//!
//! Authentication happens upstream; the proxy in front of the service forwards the
//! authenticated actor in `X-Actor-Id` and, for administrators, `X-Actor-Role: admin`.

use attache_core::{ActorContext, AppError};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::HttpAppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Extractor for the actor on whose behalf the request runs.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorContext);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing actor.".to_string()))?;

        let is_admin = parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        let actor = if is_admin {
            ActorContext::admin(id)
        } else {
            ActorContext::user(id)
        };
        Ok(Actor(actor))
    }
}
