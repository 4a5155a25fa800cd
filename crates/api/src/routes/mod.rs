//! Route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod stock_units;

use axum::http::HeaderMap;
use common::{Actor, Role, UserId};

use crate::error::ApiError;

/// Extracts the acting identity from the gateway-injected headers.
///
/// The upstream auth layer has already verified the session; these headers
/// are trusted as-is.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ApiError::BadRequest("missing or invalid x-user-id header".to_string()))?;

    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing x-user-role header".to_string()))?
        .parse::<Role>()
        .map_err(ApiError::BadRequest)?;

    Ok(Actor::new(UserId::from_i64(id), role))
}
