use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AppResult,
    bus::{BusEvent, RoomEvent, RoomListEvent},
    db::{now_millis, parse_id},
    error::{EngineError, EngineResult},
    models::{Message, MessageStatus, Millis, RoomId, UserId},
    session::CurrentUser,
};

use super::ConversationRooms;

pub(crate) const MESSAGE_COLUMNS: &str = "seq,id,room_id,sender_id,body,status,created_at";

pub(crate) type MessageRow = (i64, String, String, String, String, String, Millis);

pub(crate) fn message_from_row(
    (seq, id, room_id, sender_id, body, status, created_at): MessageRow,
) -> EngineResult<Message> {
    Ok(Message {
        id: parse_id(&id)?,
        room_id: parse_id(&room_id)?,
        sender_id: parse_id(&sender_id)?,
        body,
        status: status.parse()?,
        created_at,
        seq,
    })
}

impl ConversationRooms {
    /// Appends a message. `created_at` never goes backwards within a room,
    /// even if the wall clock does.
    pub async fn post_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        body: &str,
    ) -> EngineResult<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::validation("message body is empty"));
        }
        let max_len = self.inner.settings.max_message_len;
        if body.chars().count() > max_len {
            return Err(EngineError::validation(format!(
                "message is longer than {max_len} characters"
            )));
        }

        let (_guard, room) = self.lock_member_room(room_id, sender_id).await?;

        let id = Uuid::now_v7();
        let mut tx = self.inner.db_pool.begin().await?;

        let (seq, created_at): (i64, Millis) = sqlx::query_as(
            "INSERT INTO messages (id,room_id,sender_id,body,status,created_at) \
             SELECT ?,?,?,?,'sent',MAX(?,COALESCE(MAX(created_at),0)) \
             FROM messages WHERE room_id=? \
             RETURNING seq,created_at",
        )
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(sender_id.to_string())
        .bind(body)
        .bind(now_millis())
        .bind(room_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE rooms SET last_message_preview=?, last_activity_at=? WHERE id=?")
            .bind(self.preview(body))
            .bind(created_at)
            .bind(room_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let message = Message {
            id,
            room_id,
            sender_id,
            body: body.to_owned(),
            status: MessageStatus::Sent,
            created_at,
            seq,
        };

        let bus = &self.inner.bus;
        bus.publish(BusEvent::Room(
            room_id,
            RoomEvent::MessageCreated {
                message: message.clone(),
            },
        ));
        for member in room.members() {
            bus.publish(BusEvent::UserRooms(
                member,
                RoomListEvent::RoomUpdated {
                    room_id,
                    last_activity_at: created_at,
                },
            ));
        }

        debug!(%room_id, %sender_id, seq, "message posted");
        Ok(message)
    }

    /// Every message in the room, oldest first.
    pub async fn fetch_messages(
        &self,
        room_id: RoomId,
        reader_id: UserId,
    ) -> EngineResult<Vec<Message>> {
        self.member_room(room_id, reader_id).await?;

        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id=? ORDER BY created_at, seq"
        ))
        .bind(room_id.to_string())
        .fetch_all(&self.inner.db_pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn messages(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(rooms.fetch_messages(room_id, user_id).await?))
}

#[derive(Deserialize)]
pub(crate) struct SendMessageRequest {
    pub(crate) body: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
    Json(SendMessageRequest { body }): Json<SendMessageRequest>,
) -> AppResult<Json<Message>> {
    Ok(Json(rooms.post_message(room_id, user_id, &body).await?))
}
