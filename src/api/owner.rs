use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::response::ApiError;

/// Header carrying the principal resolved by the upstream auth proxy.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The authenticated principal making the request.
///
/// Authentication happens in front of this service; by the time a request
/// arrives here the proxy has replaced any client-sent `x-owner-id` with the
/// resolved user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub u64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing owner"))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Owner)
            .ok_or_else(|| ApiError::unauthorized("Invalid owner"))
    }
}
