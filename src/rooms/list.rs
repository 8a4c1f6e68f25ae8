use axum::{Json, debug_handler, extract::State};

use crate::{
    AppResult,
    db::parse_id,
    error::EngineResult,
    models::{Millis, Room, RoomSummary, UserId},
    profiles::fetch_profile,
    session::CurrentUser,
};

use super::ConversationRooms;

type SummaryRow = (String, String, String, Option<String>, Millis, Millis, i64);

impl ConversationRooms {
    /// The user's rooms, most recently active first. Preview and activity
    /// come from the latest message rather than the cached columns.
    pub async fn list_rooms(&self, user_id: UserId) -> EngineResult<Vec<RoomSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT r.id, r.member_a, r.member_b, \
               COALESCE((SELECT m.body FROM messages m WHERE m.room_id=r.id \
                         ORDER BY m.created_at DESC, m.seq DESC LIMIT 1), \
                        r.last_message_preview), \
               COALESCE((SELECT MAX(m.created_at) FROM messages m WHERE m.room_id=r.id), \
                        r.last_activity_at) AS activity, \
               r.created_at, \
               (SELECT COUNT(*) FROM messages m \
                WHERE m.room_id=r.id AND m.sender_id<>? AND m.status<>'read') \
             FROM rooms r WHERE r.member_a=? OR r.member_b=? \
             ORDER BY activity DESC, r.created_at DESC, r.id",
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.inner.db_pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (id, member_a, member_b, preview, last_activity_at, created_at, unread_count) in rows {
            let room = Room {
                id: parse_id(&id)?,
                member_a: parse_id(&member_a)?,
                member_b: parse_id(&member_b)?,
                last_message_preview: preview.map(|body| self.preview(&body)),
                last_activity_at,
                created_at,
            };

            let peer = match room.peer_of(user_id) {
                Some(peer_id) => fetch_profile(&self.inner.db_pool, peer_id).await?,
                None => None,
            };

            summaries.push(RoomSummary {
                room,
                peer,
                unread_count,
            });
        }

        Ok(summaries)
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn rooms(
    CurrentUser(user_id): CurrentUser,
    State(rooms): State<ConversationRooms>,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(rooms.list_rooms(user_id).await?))
}
