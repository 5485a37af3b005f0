use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use learn_core::model::UserId;

use crate::response::AppError;

pub const USER_HEADER: &str = "x-user-id";

/// Caller identity, taken from the `x-user-id` header set by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing user id"))?;

        match raw.trim().parse::<u64>() {
            Ok(id) if id > 0 => Ok(Self(UserId::new(id))),
            _ => Err(AppError::unauthorized("invalid user id")),
        }
    }
}
