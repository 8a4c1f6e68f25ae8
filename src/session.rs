use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::appresult::AppError;

pub const USER_ID: &str = "user_id";

/// The signed-in user, taken from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(msg.to_owned()))?;

        let Some(user_id) = session.get::<String>(USER_ID).await? else {
            return Err(AppError::Unauthorized);
        };

        Uuid::parse_str(&user_id)
            .map(CurrentUser)
            .map_err(|_| AppError::Unauthorized)
    }
}
