use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AppResult,
    bus::{BusEvent, RoomEvent},
    db::now_millis,
    error::EngineResult,
    models::{Message, MessageId, RoomId, UserId},
    session::CurrentUser,
};

use super::{
    ConversationRooms,
    msg::{MESSAGE_COLUMNS, MessageRow, message_from_row},
};

impl ConversationRooms {
    /// Marks the given messages read on behalf of `reader_id`. The reader's own
    /// messages and messages already read are left alone, so repeating the
    /// call changes nothing. Returns only the messages that changed.
    pub async fn mark_read(
        &self,
        room_id: RoomId,
        reader_id: UserId,
        message_ids: &[MessageId],
    ) -> EngineResult<Vec<Message>> {
        let (_guard, _) = self.lock_member_room(room_id, reader_id).await?;
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let now = now_millis();
        let mut tx = self.inner.db_pool.begin().await?;

        let mut changed = Vec::new();
        for message_id in message_ids {
            let row: Option<MessageRow> = sqlx::query_as(&format!(
                "UPDATE messages SET status='read', read_at=? \
                 WHERE id=? AND room_id=? AND sender_id<>? AND status<>'read' \
                 RETURNING {MESSAGE_COLUMNS}"
            ))
            .bind(now)
            .bind(message_id.to_string())
            .bind(room_id.to_string())
            .bind(reader_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                changed.push(message_from_row(row)?);
            }
        }

        tx.commit().await?;

        for message in &changed {
            self.inner.bus.publish(BusEvent::Room(
                room_id,
                RoomEvent::MessageUpdated {
                    message: message.clone(),
                },
            ));
        }

        debug!(%room_id, %reader_id, changed = changed.len(), "messages read");
        Ok(changed)
    }

    /// Messages from the peer that `user_id` has not read yet.
    pub async fn unread_count(&self, room_id: RoomId, user_id: UserId) -> EngineResult<i64> {
        self.member_room(room_id, user_id).await?;

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE room_id=? AND sender_id<>? AND status<>'read'",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(&self.inner.db_pool)
        .await?;

        Ok(count)
    }
}

#[derive(Deserialize)]
pub(crate) struct ReadRequest {
    pub(crate) message_ids: Vec<MessageId>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn read(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
    Json(ReadRequest { message_ids }): Json<ReadRequest>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(rooms.mark_read(room_id, user_id, &message_ids).await?))
}
