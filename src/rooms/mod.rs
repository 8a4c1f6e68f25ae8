//! Conversation rooms: one per matched pair.
//!
//! Writes that publish to a room topic (new messages, read receipts, typing
//! and unmatch) run under a per-room async lock, so subscribers see events in
//! the same order the store committed them. Lock entries exist only for rooms
//! that exist.

mod list;
mod msg;
mod read;
mod room;
mod typing;
mod unmatch;
mod ws;

use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    routing::{delete, get, post},
};
use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    AppState,
    bus::RealtimeBus,
    config::RoomSettings,
    error::EngineResult,
    models::{Room, RoomId, TypingState, UserId},
};

pub(crate) use room::fetch_room_by_pair;

#[derive(Clone)]
pub struct ConversationRooms {
    inner: Arc<RoomsInner>,
}

struct RoomsInner {
    db_pool: SqlitePool,
    bus: RealtimeBus,
    settings: RoomSettings,
    typing: DashMap<RoomId, HashMap<UserId, TypingState>>,
    locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl ConversationRooms {
    pub fn new(db_pool: SqlitePool, bus: RealtimeBus, settings: RoomSettings) -> Self {
        Self {
            inner: Arc::new(RoomsInner {
                db_pool,
                bus,
                settings,
                typing: DashMap::new(),
                locks: DashMap::new(),
            }),
        }
    }

    fn room_lock(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        self.inner.locks.entry(room_id).or_default().value().clone()
    }

    /// Takes the room's lock and checks membership while holding it.
    async fn lock_member_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> EngineResult<(OwnedMutexGuard<()>, Room)> {
        let lock = self.room_lock(room_id);
        let guard = lock.clone().lock_owned().await;

        match self.member_room(room_id, user_id).await {
            Ok(room) => Ok((guard, room)),
            Err(err) => {
                if err.is_not_found() {
                    drop(guard);
                    self.forget_lock(room_id, &lock);
                }
                Err(err)
            }
        }
    }

    /// Drops the lock entry for a room that is gone, unless someone has
    /// already replaced it.
    fn forget_lock(&self, room_id: RoomId, lock: &Arc<Mutex<()>>) {
        self.inner.locks.remove_if(&room_id, |_, held| Arc::ptr_eq(held, lock));
    }

    fn preview(&self, body: &str) -> String {
        body.chars().take(self.inner.settings.preview_len).collect()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/r", get(list::rooms))
        .route("/r/{uuid}", delete(unmatch::unmatch_room))
        .route("/r/{uuid}/messages", get(msg::messages).post(msg::send))
        .route("/r/{uuid}/read", post(read::read))
        .route("/r/{uuid}/typing", get(typing::typing).post(typing::set))
        .route("/r/{uuid}/ws", get(ws::room_ws))
        .route("/ws", get(ws::user_ws))
}
