#![allow(dead_code)]

use std::sync::Arc;

use rishiconnect::{
    AppState,
    config::Settings,
    db,
    models::{RoomId, SwipeAction, UserId},
    notifier::LogNotifier,
    profiles::{ProfileUpdate, upsert_profile},
};
use uuid::Uuid;

pub struct Harness {
    pub state: AppState,
    pub users: Vec<UserId>,
}

pub async fn harness(names: &[&str]) -> Harness {
    harness_with(Settings::default(), names).await
}

pub async fn harness_with(settings: Settings, names: &[&str]) -> Harness {
    let db_pool = db::memory().await.expect("in-memory database");

    let mut users = Vec::with_capacity(names.len());
    for name in names {
        let id = Uuid::now_v7();
        let update = ProfileUpdate {
            name: (*name).to_owned(),
            interests: vec!["music".to_owned()],
            ..Default::default()
        };
        upsert_profile(&db_pool, id, update).await.expect("seed profile");
        users.push(id);
    }

    Harness {
        state: AppState::new(db_pool, settings, Arc::new(LogNotifier)),
        users,
    }
}

impl Harness {
    /// Likes in both directions and returns the room.
    pub async fn matched(&self, a: UserId, b: UserId) -> RoomId {
        self.state.swipes.record_swipe(a, b, SwipeAction::Like).await.unwrap();
        let outcome = self.state.swipes.record_swipe(b, a, SwipeAction::Like).await.unwrap();
        assert!(outcome.matched);
        outcome.room_id.unwrap()
    }

    /// Ids of the user's next feed batch at the default limit.
    pub async fn feed_ids(&self, user_id: UserId) -> Vec<UserId> {
        let batch = self.state.feed.next_batch(user_id, None).await.unwrap();
        batch.into_iter().map(|profile| profile.id).collect()
    }

    pub async fn count(&self, sql: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&self.state.db_pool).await.unwrap();
        count
    }
}
