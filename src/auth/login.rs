use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::info;

use crate::{AppResult, appresult::AppError, models::UserId, session::USER_ID};

use super::IdentityProvider;

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
}

#[debug_handler(state = crate::AppState)]
pub async fn login(
    State(identity): State<Arc<dyn IdentityProvider>>,
    session: Session,
    Json(LoginRequest { token }): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let Some(user_id) = identity.verify(&token).await else {
        return Err(AppError::Unauthorized);
    };

    session.cycle_id().await?;
    session.insert(USER_ID, user_id.to_string()).await?;

    info!(%user_id, "signed in");
    Ok(Json(LoginResponse { user_id }))
}
