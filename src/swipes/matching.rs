//! Match creation. Both match rows and the room are written in the caller's
//! transaction with `INSERT OR IGNORE`, so when two mutual likes race the
//! second writer finds the first one's rows and reports the same room.

use std::sync::Arc;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::{
    bus::{BusEvent, RealtimeBus, RoomListEvent},
    db::now_millis,
    error::{EngineError, EngineResult},
    models::{Room, SwipeOutcome, UserId, canonical_pair},
    notifier::{PushNotifier, spawn_match},
    profiles::require_profile,
    rooms::fetch_room_by_pair,
};

#[derive(Clone)]
pub struct MatchCoordinator {
    db_pool: SqlitePool,
    bus: RealtimeBus,
    notifier: Arc<dyn PushNotifier>,
}

impl MatchCoordinator {
    pub fn new(db_pool: SqlitePool, bus: RealtimeBus, notifier: Arc<dyn PushNotifier>) -> Self {
        Self { db_pool, bus, notifier }
    }

    /// Creates the match between two users who like each other and returns
    /// it from `user_a`'s side. Calling it again for the same pair, in either
    /// order, reports the existing room.
    pub async fn create_match(&self, user_a: UserId, user_b: UserId) -> EngineResult<SwipeOutcome> {
        if user_a == user_b {
            return Err(EngineError::validation("cannot match with yourself"));
        }

        let mut tx = self.db_pool.begin().await?;
        let (room, created) = self.insert_pair(&mut tx, user_a, user_b).await?;

        let (likes,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM swipes WHERE action='like' \
             AND ((actor_id=? AND target_id=?) OR (actor_id=? AND target_id=?))",
        )
        .bind(user_a.to_string())
        .bind(user_b.to_string())
        .bind(user_b.to_string())
        .bind(user_a.to_string())
        .fetch_one(&mut *tx)
        .await?;

        if likes != 2 {
            tx.rollback().await?;
            return Err(EngineError::validation("a match needs a like from both sides"));
        }

        let matched_profile = require_profile(&mut *tx, user_b).await?;
        tx.commit().await?;

        self.announce(&room, created);
        Ok(SwipeOutcome {
            matched: true,
            matched_profile: Some(matched_profile),
            room_id: Some(room.id),
        })
    }

    /// Writes both match rows and the room. `created` is false when another
    /// writer got there first.
    pub(crate) async fn insert_pair(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_a: UserId,
        user_b: UserId,
    ) -> EngineResult<(Room, bool)> {
        let (low, high) = canonical_pair(user_a, user_b);
        let (low, high) = (low.to_string(), high.to_string());
        let now = now_millis();

        sqlx::query(
            "INSERT OR IGNORE INTO matches (user_id,matched_user_id,pair_low,pair_high,created_at) \
             VALUES (?,?,?,?,?),(?,?,?,?,?)",
        )
        .bind(&low)
        .bind(&high)
        .bind(&low)
        .bind(&high)
        .bind(now)
        .bind(&high)
        .bind(&low)
        .bind(&low)
        .bind(&high)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let created = sqlx::query(
            "INSERT OR IGNORE INTO rooms (id,member_a,member_b,last_activity_at,created_at) \
             VALUES (?,?,?,?,?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&low)
        .bind(&high)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?
        .rows_affected()
            == 1;

        let room = fetch_room_by_pair(&mut **tx, user_a, user_b)
            .await?
            .ok_or_else(|| EngineError::Internal("room missing right after insert".to_owned()))?;

        Ok((room, created))
    }

    /// Post-commit side effects. Nothing here can fail the match, and the push
    /// notification goes out after both members already have the room.
    pub(crate) fn announce(&self, room: &Room, created: bool) {
        if !created {
            return;
        }

        self.bus.publish(BusEvent::UserRooms(
            room.member_a,
            RoomListEvent::RoomCreated {
                room_id: room.id,
                peer_id: room.member_b,
            },
        ));
        self.bus.publish(BusEvent::UserRooms(
            room.member_b,
            RoomListEvent::RoomCreated {
                room_id: room.id,
                peer_id: room.member_a,
            },
        ));

        spawn_match(self.notifier.clone(), room.member_a, room.member_b);

        info!(room_id = %room.id, member_a = %room.member_a, member_b = %room.member_b, "matched");
    }
}
