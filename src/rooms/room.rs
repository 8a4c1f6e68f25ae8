use sqlx::SqliteExecutor;

use crate::{
    db::parse_id,
    error::{EngineError, EngineResult},
    models::{Millis, Room, RoomId, UserId, canonical_pair},
};

use super::ConversationRooms;

pub(crate) const ROOM_COLUMNS: &str =
    "id,member_a,member_b,last_message_preview,last_activity_at,created_at";

pub(crate) type RoomRow = (String, String, String, Option<String>, Millis, Millis);

pub(crate) fn room_from_row(
    (id, member_a, member_b, last_message_preview, last_activity_at, created_at): RoomRow,
) -> EngineResult<Room> {
    Ok(Room {
        id: parse_id(&id)?,
        member_a: parse_id(&member_a)?,
        member_b: parse_id(&member_b)?,
        last_message_preview,
        last_activity_at,
        created_at,
    })
}

pub(crate) async fn fetch_room<'e, E>(executor: E, room_id: RoomId) -> EngineResult<Option<Room>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<RoomRow> =
        sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id=?"))
            .bind(room_id.to_string())
            .fetch_optional(executor)
            .await?;

    row.map(room_from_row).transpose()
}

pub(crate) async fn fetch_room_by_pair<'e, E>(
    executor: E,
    a: UserId,
    b: UserId,
) -> EngineResult<Option<Room>>
where
    E: SqliteExecutor<'e>,
{
    let (member_a, member_b) = canonical_pair(a, b);
    let row: Option<RoomRow> =
        sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE member_a=? AND member_b=?"))
            .bind(member_a.to_string())
            .bind(member_b.to_string())
            .fetch_optional(executor)
            .await?;

    row.map(room_from_row).transpose()
}

impl ConversationRooms {
    /// The room, if `user_id` belongs to it.
    pub async fn member_room(&self, room_id: RoomId, user_id: UserId) -> EngineResult<Room> {
        let room = fetch_room(&self.inner.db_pool, room_id)
            .await?
            .ok_or(EngineError::NotFound("room"))?;

        if !room.has_member(user_id) {
            return Err(EngineError::NotMember { room: room_id, user: user_id });
        }
        Ok(room)
    }
}
