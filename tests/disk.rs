use std::sync::Arc;

use rishiconnect::{
    AppState,
    config::Settings,
    db,
    models::SwipeAction,
    notifier::LogNotifier,
    profiles::{ProfileUpdate, upsert_profile},
};
use tempfile::TempDir;
use uuid::Uuid;

fn named(name: &str) -> ProfileUpdate {
    ProfileUpdate {
        name: name.to_owned(),
        ..Default::default()
    }
}

#[tokio::test]
async fn matches_and_messages_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("rishiconnect.db").display());
    let (anu, bela) = (Uuid::now_v7(), Uuid::now_v7());

    let room_id = {
        let db_pool = db::connect(&url, 4).await.unwrap();
        upsert_profile(&db_pool, anu, named("Anu")).await.unwrap();
        upsert_profile(&db_pool, bela, named("Bela")).await.unwrap();

        let state = AppState::new(db_pool.clone(), Settings::default(), Arc::new(LogNotifier));
        state.swipes.record_swipe(anu, bela, SwipeAction::Like).await.unwrap();
        let outcome = state.swipes.record_swipe(bela, anu, SwipeAction::Like).await.unwrap();
        let room_id = outcome.room_id.unwrap();
        state.rooms.post_message(room_id, anu, "still here?").await.unwrap();

        db_pool.close().await;
        room_id
    };

    let db_pool = db::connect(&url, 4).await.unwrap();
    let state = AppState::new(db_pool, Settings::default(), Arc::new(LogNotifier));

    let messages = state.rooms.fetch_messages(room_id, bela).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "still here?");
    assert!(state.feed.next_batch(anu, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_mutual_likes_on_a_shared_file() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("race.db").display());
    let db_pool = db::connect(&url, 4).await.unwrap();

    let (anu, bela) = (Uuid::now_v7(), Uuid::now_v7());
    upsert_profile(&db_pool, anu, named("Anu")).await.unwrap();
    upsert_profile(&db_pool, bela, named("Bela")).await.unwrap();

    let state = AppState::new(db_pool.clone(), Settings::default(), Arc::new(LogNotifier));
    let (left, right) = tokio::join!(
        state.swipes.record_swipe(anu, bela, SwipeAction::Like),
        state.swipes.record_swipe(bela, anu, SwipeAction::Like),
    );
    let (left, right) = (left.unwrap(), right.unwrap());
    assert!(left.matched ^ right.matched);

    let (rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
        .fetch_one(&db_pool)
        .await
        .unwrap();
    assert_eq!(rooms, 1);
}
