mod common;

use common::harness;
use rishiconnect::{
    config::{FeedSettings, Settings},
    models::SwipeAction,
};
use uuid::Uuid;

#[tokio::test]
async fn feed_excludes_self_and_swiped_in_creation_order() {
    let h = harness(&["Anu", "Bela", "Chitra", "Dev"]).await;
    let [anu, bela, chitra, dev] = h.users[..] else { unreachable!() };

    let ids = h.feed_ids(anu).await;
    assert_eq!(ids, vec![bela, chitra, dev]);

    h.state.swipes.record_swipe(anu, bela, SwipeAction::Pass).await.unwrap();
    h.state.swipes.record_swipe(anu, dev, SwipeAction::Like).await.unwrap();

    let ids = h.feed_ids(anu).await;
    assert_eq!(ids, vec![chitra]);

    // being swiped on does not hide anyone from the swiper's own feed
    let ids = h.feed_ids(bela).await;
    assert_eq!(ids, vec![anu, chitra, dev]);
}

#[tokio::test]
async fn exhausted_feed_is_empty_not_an_error() {
    let h = harness(&["Anu", "Bela"]).await;
    let [anu, bela] = h.users[..] else { unreachable!() };

    h.state.swipes.record_swipe(anu, bela, SwipeAction::Pass).await.unwrap();
    assert!(h.state.feed.next_batch(anu, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn limit_is_clamped_to_configured_maximum() {
    let settings = Settings {
        feed: FeedSettings {
            default_limit: 2,
            max_limit: 3,
        },
        ..Default::default()
    };
    let h = common::harness_with(settings, &["Anu", "Bela", "Chitra", "Dev", "Esha"]).await;
    let anu = h.users[0];

    assert_eq!(h.state.feed.next_batch(anu, None).await.unwrap().len(), 2);
    assert_eq!(h.state.feed.next_batch(anu, Some(50)).await.unwrap().len(), 3);
    assert!(h.state.feed.next_batch(anu, Some(0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn skip_remaining_is_idempotent() {
    let h = harness(&["Anu", "Bela", "Chitra", "Dev"]).await;
    let [anu, bela, chitra, dev] = h.users[..] else { unreachable!() };

    h.state.swipes.record_swipe(anu, bela, SwipeAction::Like).await.unwrap();

    let ids = [bela, chitra, anu, Uuid::now_v7()];
    assert_eq!(h.state.feed.skip_remaining(anu, &ids).await.unwrap(), 1);
    assert_eq!(h.state.feed.skip_remaining(anu, &ids).await.unwrap(), 0);

    // the earlier like is not overwritten by the bulk pass
    let (action,): (String,) =
        sqlx::query_as("SELECT action FROM swipes WHERE actor_id=? AND target_id=?")
            .bind(anu.to_string())
            .bind(bela.to_string())
            .fetch_one(&h.state.db_pool)
            .await
            .unwrap();
    assert_eq!(action, "like");

    let ids = h.feed_ids(anu).await;
    assert_eq!(ids, vec![dev]);
}

#[tokio::test]
async fn skip_for_unknown_actor_is_not_found() {
    let h = harness(&["Anu"]).await;
    let err = h.state.feed.skip_remaining(Uuid::now_v7(), &[]).await.unwrap_err();
    assert!(err.is_not_found());
}
