use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;
use uuid::Uuid;

use crate::{error::EngineResult, models::Millis};

// tables: profiles, swipes, matches, rooms, messages
// unique: swipes(actor_id, target_id)
// unique: matches(user_id, matched_user_id)
// unique: rooms(member_a, member_b), member_a < member_b
// messages cascade with their room

/// Opens the pool and brings the schema up to date.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    info!(database_url, max_connections, "database ready");

    Ok(db_pool)
}

/// In-memory database behind a single connection that is never recycled, so
/// the data lives as long as the pool.
pub async fn memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}

pub fn now_millis() -> Millis {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as Millis
}

pub(crate) fn parse_id(raw: &str) -> EngineResult<Uuid> {
    Ok(Uuid::parse_str(raw)?)
}
