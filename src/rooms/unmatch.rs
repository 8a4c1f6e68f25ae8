use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    AppResult,
    bus::{BusEvent, RoomEvent, RoomListEvent},
    db::now_millis,
    error::{EngineError, EngineResult},
    models::{Room, RoomId, UserId},
    session::CurrentUser,
};

use super::{
    ConversationRooms,
    room::{ROOM_COLUMNS, RoomRow, room_from_row},
};

impl ConversationRooms {
    /// Removes the room with its messages, the match rows and the pair's
    /// swipes, all or nothing. Both users are left with a pass on each
    /// other so neither comes back in the other's feed. A room that is
    /// already gone is `NotFound`.
    pub async fn unmatch(&self, room_id: RoomId, initiator_id: UserId) -> EngineResult<Room> {
        let lock = self.room_lock(room_id);
        let guard = lock.lock().await;

        let mut tx = self.inner.db_pool.begin().await?;

        let messages = sqlx::query(
            "DELETE FROM messages WHERE room_id IN \
             (SELECT id FROM rooms WHERE id=? AND (member_a=? OR member_b=?))",
        )
        .bind(room_id.to_string())
        .bind(initiator_id.to_string())
        .bind(initiator_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let removed: Option<RoomRow> = sqlx::query_as(&format!(
            "DELETE FROM rooms WHERE id=? AND (member_a=? OR member_b=?) RETURNING {ROOM_COLUMNS}"
        ))
        .bind(room_id.to_string())
        .bind(initiator_id.to_string())
        .bind(initiator_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(room) = removed.map(room_from_row).transpose()? else {
            let exists = sqlx::query("SELECT 1 FROM rooms WHERE id=?")
                .bind(room_id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            drop(tx);
            if exists {
                return Err(EngineError::NotMember { room: room_id, user: initiator_id });
            }
            drop(guard);
            self.forget_lock(room_id, &lock);
            return Err(EngineError::NotFound("room"));
        };

        let (a, b) = (room.member_a.to_string(), room.member_b.to_string());

        sqlx::query("DELETE FROM matches WHERE pair_low=? AND pair_high=?")
            .bind(&a)
            .bind(&b)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM swipes \
             WHERE (actor_id=? AND target_id=?) OR (actor_id=? AND target_id=?)",
        )
        .bind(&a)
        .bind(&b)
        .bind(&b)
        .bind(&a)
        .execute(&mut *tx)
        .await?;

        let now = now_millis();
        sqlx::query(
            "INSERT INTO swipes (actor_id,target_id,action,created_at) \
             VALUES (?,?,'pass',?),(?,?,'pass',?)",
        )
        .bind(&a)
        .bind(&b)
        .bind(now)
        .bind(&b)
        .bind(&a)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.inner.typing.remove(&room_id);

        let bus = &self.inner.bus;
        bus.publish(BusEvent::Room(room_id, RoomEvent::RoomRemoved { room_id }));
        for member in room.members() {
            bus.publish(BusEvent::UserRooms(member, RoomListEvent::RoomRemoved { room_id }));
        }

        drop(guard);
        self.forget_lock(room_id, &lock);

        info!(%room_id, %initiator_id, messages, "unmatched");
        Ok(room)
    }
}

/// Unmatching twice is not an error for the client: the room is gone either way.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn unmatch_room(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
) -> AppResult<StatusCode> {
    match rooms.unmatch(room_id, user_id).await {
        Ok(_) | Err(EngineError::NotFound(_)) => Ok(StatusCode::NO_CONTENT),
        Err(err) => Err(err.into()),
    }
}
