mod feed;
mod page;

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::SqliteExecutor;

use crate::{
    AppState,
    db::parse_id,
    error::{EngineError, EngineResult},
    models::{Millis, Profile, UserId},
};

pub use feed::ProfileFeed;
pub use page::{ProfileUpdate, get_profile, set_push_token, upsert_profile};

pub(crate) const PROFILE_COLUMNS: &str = "id,name,bio,year,major,interests,photo_url,created_at";

pub(crate) type ProfileRow = (
    String,
    String,
    String,
    Option<i32>,
    Option<String>,
    String,
    Option<String>,
    Millis,
);

pub(crate) fn profile_from_row(
    (id, name, bio, year, major, interests, photo_url, created_at): ProfileRow,
) -> EngineResult<Profile> {
    Ok(Profile {
        id: parse_id(&id)?,
        name,
        bio,
        year,
        major,
        interests: serde_json::from_str(&interests)?,
        photo_url,
        created_at,
    })
}

pub(crate) async fn fetch_profile<'e, E>(
    executor: E,
    user_id: UserId,
) -> EngineResult<Option<Profile>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<ProfileRow> =
        sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
            .bind(user_id.to_string())
            .fetch_optional(executor)
            .await?;

    row.map(profile_from_row).transpose()
}

pub(crate) async fn require_profile<'e, E>(executor: E, user_id: UserId) -> EngineResult<Profile>
where
    E: SqliteExecutor<'e>,
{
    fetch_profile(executor, user_id)
        .await?
        .ok_or(EngineError::NotFound("profile"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/p/{uuid}", get(page::profile))
        .route("/me/profile", get(page::my_profile).put(page::update_my_profile))
        .route("/me/push-token", put(page::update_push_token))
        .route("/feed", get(feed::feed))
        .route("/feed/skip", post(feed::skip))
}
