//! Candidate selection. This is an exclusion filter only: everyone the
//! user has not swiped on yet, oldest profiles first.

use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::{
    AppResult,
    config::FeedSettings,
    db::now_millis,
    error::EngineResult,
    models::{Profile, UserId},
    session::CurrentUser,
};

use super::{PROFILE_COLUMNS, ProfileRow, profile_from_row, require_profile};

#[derive(Clone)]
pub struct ProfileFeed {
    db_pool: SqlitePool,
    settings: Arc<FeedSettings>,
}

impl ProfileFeed {
    pub fn new(db_pool: SqlitePool, settings: FeedSettings) -> Self {
        Self {
            db_pool,
            settings: Arc::new(settings),
        }
    }

    /// Up to `limit` profiles the user has not swiped on, in creation order.
    /// `None` falls back to the configured default; anything above the
    /// configured maximum is clamped.
    pub async fn next_batch(
        &self,
        user_id: UserId,
        limit: Option<u32>,
    ) -> EngineResult<Vec<Profile>> {
        let limit = limit
            .unwrap_or(self.settings.default_limit)
            .min(self.settings.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id<>? \
             AND NOT EXISTS (SELECT 1 FROM swipes s WHERE s.actor_id=? AND s.target_id=p.id) \
             ORDER BY p.created_at, p.rowid LIMIT ?"
        ))
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(profile_from_row).collect()
    }

    /// Records a pass on every id. Ids that were already swiped, the user's
    /// own id and unknown ids are skipped. Returns how many passes were new.
    pub async fn skip_remaining(&self, user_id: UserId, ids: &[UserId]) -> EngineResult<u64> {
        let now = now_millis();
        let mut tx = self.db_pool.begin().await?;

        let mut skipped = 0;
        for target_id in ids {
            skipped += sqlx::query(
                "INSERT OR IGNORE INTO swipes (actor_id,target_id,action,created_at) \
                 SELECT ?,id,'pass',? FROM profiles WHERE id=? AND id<>?",
            )
            .bind(user_id.to_string())
            .bind(now)
            .bind(target_id.to_string())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        // also rejects an unknown actor when no target matched
        require_profile(&mut *tx, user_id).await?;
        tx.commit().await?;

        debug!(%user_id, requested = ids.len(), skipped, "feed skipped");
        Ok(skipped)
    }
}

#[derive(Deserialize)]
pub(crate) struct FeedQuery {
    limit: Option<u32>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn feed(
    CurrentUser(user_id): CurrentUser,
    State(feed): State<ProfileFeed>,
    Query(FeedQuery { limit }): Query<FeedQuery>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(feed.next_batch(user_id, limit).await?))
}

#[derive(Deserialize)]
pub(crate) struct SkipRequest {
    ids: Vec<UserId>,
}

#[derive(Serialize)]
pub(crate) struct SkipResponse {
    skipped: u64,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn skip(
    CurrentUser(user_id): CurrentUser,
    State(feed): State<ProfileFeed>,
    Json(SkipRequest { ids }): Json<SkipRequest>,
) -> AppResult<Json<SkipResponse>> {
    let skipped = feed.skip_remaining(user_id, &ids).await?;
    Ok(Json(SkipResponse { skipped }))
}
