use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AppResult,
    db::now_millis,
    error::{EngineError, EngineResult},
    models::{Profile, UserId},
    session::CurrentUser,
};

use super::{fetch_profile, require_profile};

const MAX_NAME_LEN: usize = 80;

/// Everything the owner may set on their profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

pub async fn get_profile(db_pool: &SqlitePool, user_id: UserId) -> EngineResult<Profile> {
    require_profile(db_pool, user_id).await
}

/// Creates the caller's profile on first use, then overwrites the mutable
/// fields. `created_at` is kept so feed order is stable.
pub async fn upsert_profile(
    db_pool: &SqlitePool,
    user_id: UserId,
    update: ProfileUpdate,
) -> EngineResult<Profile> {
    let name = update.name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::validation(format!(
            "name is longer than {MAX_NAME_LEN} characters"
        )));
    }

    let mut interests: Vec<String> = Vec::with_capacity(update.interests.len());
    for interest in update.interests {
        let interest = interest.trim();
        if !interest.is_empty() && !interests.iter().any(|seen| seen == interest) {
            interests.push(interest.to_owned());
        }
    }

    let now = now_millis();
    sqlx::query(
        "INSERT INTO profiles \
         (id,name,bio,year,major,interests,photo_url,created_at,updated_at) \
         VALUES (?,?,?,?,?,?,?,?,?) \
         ON CONFLICT(id) DO UPDATE SET name=excluded.name, bio=excluded.bio, \
         year=excluded.year, major=excluded.major, interests=excluded.interests, \
         photo_url=excluded.photo_url, updated_at=excluded.updated_at",
    )
    .bind(user_id.to_string())
    .bind(name)
    .bind(update.bio.trim())
    .bind(update.year)
    .bind(update.major.as_deref().map(str::trim).filter(|major| !major.is_empty()))
    .bind(serde_json::to_string(&interests)?)
    .bind(update.photo_url.as_deref())
    .bind(now)
    .bind(now)
    .execute(db_pool)
    .await?;

    debug!(%user_id, "profile saved");
    require_profile(db_pool, user_id).await
}

pub async fn set_push_token(
    db_pool: &SqlitePool,
    user_id: UserId,
    token: Option<&str>,
) -> EngineResult<()> {
    let updated = sqlx::query("UPDATE profiles SET push_token=?, updated_at=? WHERE id=?")
        .bind(token)
        .bind(now_millis())
        .bind(user_id.to_string())
        .execute(db_pool)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(EngineError::NotFound("profile"));
    }
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(
    CurrentUser(_): CurrentUser,
    Path(profile_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Profile>> {
    Ok(Json(get_profile(&db_pool, profile_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn my_profile(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Option<Profile>>> {
    Ok(Json(fetch_profile(&db_pool, user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_my_profile(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Profile>> {
    Ok(Json(upsert_profile(&db_pool, user_id, update).await?))
}

#[derive(Deserialize)]
pub(crate) struct PushTokenRequest {
    token: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_push_token(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Json(PushTokenRequest { token }): Json<PushTokenRequest>,
) -> AppResult<StatusCode> {
    set_push_token(&db_pool, user_id, token.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
