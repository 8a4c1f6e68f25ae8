mod engine;
mod matching;

use axum::{Json, Router, debug_handler, extract::State, routing::post};
use serde::Deserialize;

use crate::{
    AppResult, AppState,
    models::{SwipeAction, SwipeOutcome, UserId},
    session::CurrentUser,
};

pub use engine::SwipeEngine;
pub use matching::MatchCoordinator;

#[derive(Deserialize)]
pub(crate) struct SwipeRequest {
    target_id: UserId,
    action: SwipeAction,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn swipe(
    CurrentUser(user_id): CurrentUser,
    State(swipes): State<SwipeEngine>,
    Json(SwipeRequest { target_id, action }): Json<SwipeRequest>,
) -> AppResult<Json<SwipeOutcome>> {
    Ok(Json(swipes.record_swipe(user_id, target_id, action).await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/swipes", post(swipe))
}
