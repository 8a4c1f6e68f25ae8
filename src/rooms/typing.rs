use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppResult,
    bus::{BusEvent, RoomEvent},
    db::now_millis,
    error::EngineResult,
    models::{RoomId, TypingState, UserId},
    session::CurrentUser,
};

use super::ConversationRooms;

impl ConversationRooms {
    /// Last write wins. Typing state lives in memory only and goes away
    /// with the room; the room lock keeps an unmatch from slipping in between
    /// the membership check and the write.
    pub async fn set_typing(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    ) -> EngineResult<TypingState> {
        let (_guard, _) = self.lock_member_room(room_id, user_id).await?;

        let typing = TypingState {
            room_id,
            user_id,
            is_typing,
            updated_at: now_millis(),
        };
        self.inner
            .typing
            .entry(room_id)
            .or_default()
            .insert(user_id, typing.clone());

        self.inner.bus.publish(BusEvent::Room(
            room_id,
            RoomEvent::TypingChanged {
                typing: typing.clone(),
            },
        ));
        Ok(typing)
    }

    /// Who is typing in the room right now.
    pub async fn typing_states(
        &self,
        room_id: RoomId,
        reader_id: UserId,
    ) -> EngineResult<Vec<TypingState>> {
        self.member_room(room_id, reader_id).await?;

        Ok(self
            .inner
            .typing
            .get(&room_id)
            .map(|states| states.values().filter(|state| state.is_typing).cloned().collect())
            .unwrap_or_default())
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn typing(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
) -> AppResult<Json<Vec<TypingState>>> {
    Ok(Json(rooms.typing_states(room_id, user_id).await?))
}

#[derive(Deserialize)]
pub(crate) struct TypingRequest {
    pub(crate) is_typing: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
    Json(TypingRequest { is_typing }): Json<TypingRequest>,
) -> AppResult<Json<TypingState>> {
    Ok(Json(rooms.set_typing(room_id, user_id, is_typing).await?))
}
