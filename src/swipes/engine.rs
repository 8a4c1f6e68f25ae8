use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::debug;

use crate::{
    db::now_millis,
    error::{EngineError, EngineResult},
    models::{SwipeAction, SwipeOutcome, UserId},
    notifier::{PushNotifier, spawn_like},
    profiles::require_profile,
};

use super::MatchCoordinator;

#[derive(Clone)]
pub struct SwipeEngine {
    db_pool: SqlitePool,
    coordinator: MatchCoordinator,
    notifier: Arc<dyn PushNotifier>,
}

impl SwipeEngine {
    pub fn new(
        db_pool: SqlitePool,
        coordinator: MatchCoordinator,
        notifier: Arc<dyn PushNotifier>,
    ) -> Self {
        Self {
            db_pool,
            coordinator,
            notifier,
        }
    }

    /// Records `actor_id`'s decision on `target_id`.
    ///
    /// The swipe insert is the first statement of the transaction, so the
    /// store takes the write lock before the reciprocal like is read. Two
    /// users liking each other at the same moment are therefore serialized:
    /// whichever commits second sees the other's like and creates the match.
    pub async fn record_swipe(
        &self,
        actor_id: UserId,
        target_id: UserId,
        action: SwipeAction,
    ) -> EngineResult<SwipeOutcome> {
        if actor_id == target_id {
            return Err(EngineError::validation("cannot swipe on yourself"));
        }

        let mut tx = self.db_pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO swipes (actor_id,target_id,action,created_at) VALUES (?,?,?,?)",
        )
        .bind(actor_id.to_string())
        .bind(target_id.to_string())
        .bind(action.as_str())
        .bind(now_millis())
        .execute(&mut *tx)
        .await
        .map_err(|err| match EngineError::from(err) {
            EngineError::NotFound(_) => EngineError::NotFound("profile"),
            other => other,
        })?
        .rows_affected();

        if inserted == 0 {
            return Err(EngineError::DuplicateSwipe {
                actor: actor_id,
                target: target_id,
            });
        }

        debug!(%actor_id, %target_id, %action, "swipe recorded");

        if action == SwipeAction::Pass {
            tx.commit().await?;
            return Ok(SwipeOutcome::no_match());
        }

        let reciprocal =
            sqlx::query("SELECT 1 FROM swipes WHERE actor_id=? AND target_id=? AND action='like'")
                .bind(target_id.to_string())
                .bind(actor_id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();

        if !reciprocal {
            tx.commit().await?;
            spawn_like(self.notifier.clone(), actor_id, target_id);
            return Ok(SwipeOutcome::no_match());
        }

        let (room, created) = self.coordinator.insert_pair(&mut tx, actor_id, target_id).await?;
        let matched_profile = require_profile(&mut *tx, target_id).await?;
        tx.commit().await?;

        self.coordinator.announce(&room, created);
        Ok(SwipeOutcome {
            matched: true,
            matched_profile: Some(matched_profile),
            room_id: Some(room.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{Delivery, RealtimeBus, RoomListEvent},
        db,
        notifier::{MockPushNotifier, NotifierError},
        profiles::{ProfileUpdate, upsert_profile},
    };
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::{sync::mpsc, time::Instant};
    use uuid::Uuid;

    async fn seeded(
        notifier: impl PushNotifier + 'static,
    ) -> (SwipeEngine, RealtimeBus, UserId, UserId) {
        let db_pool = db::memory().await.unwrap();
        let mut ids = Vec::new();
        for name in ["Meera", "Kabir"] {
            let id = Uuid::now_v7();
            let update = ProfileUpdate {
                name: name.to_owned(),
                ..Default::default()
            };
            upsert_profile(&db_pool, id, update).await.unwrap();
            ids.push(id);
        }

        let bus = RealtimeBus::new(16);
        let notifier: Arc<dyn PushNotifier> = Arc::new(notifier);
        let coordinator = MatchCoordinator::new(db_pool.clone(), bus.clone(), notifier.clone());
        (SwipeEngine::new(db_pool, coordinator, notifier), bus, ids[0], ids[1])
    }

    #[tokio::test]
    async fn one_sided_like_notifies_target_once() {
        let (sent, mut delivered) = mpsc::unbounded_channel();
        let mut notifier = MockPushNotifier::new();
        notifier.expect_notify_like().times(1).returning(move |from, to| {
            sent.send((from, to)).unwrap();
            Ok(())
        });
        notifier.expect_notify_match().never();

        let (engine, _bus, a, b) = seeded(notifier).await;
        let outcome = engine.record_swipe(a, b, SwipeAction::Like).await.unwrap();
        assert!(!outcome.matched);
        assert_eq!(delivered.recv().await, Some((a, b)));
    }

    #[tokio::test]
    async fn mutual_like_notifies_match_and_survives_notifier_failure() {
        let (sent, mut delivered) = mpsc::unbounded_channel();
        let like_sent = sent.clone();
        let mut notifier = MockPushNotifier::new();
        notifier.expect_notify_like().times(1).returning(move |_, _| {
            like_sent.send("like").unwrap();
            Ok(())
        });
        notifier.expect_notify_match().times(1).returning(move |_, _| {
            sent.send("match").unwrap();
            Err(NotifierError::Rejected(502))
        });

        let (engine, _bus, a, b) = seeded(notifier).await;
        engine.record_swipe(a, b, SwipeAction::Like).await.unwrap();
        let outcome = engine.record_swipe(b, a, SwipeAction::Like).await.unwrap();

        assert!(outcome.matched);
        assert_eq!(outcome.matched_profile.map(|p| p.id), Some(a));
        assert!(outcome.room_id.is_some());

        let mut kinds = vec![delivered.recv().await.unwrap(), delivered.recv().await.unwrap()];
        kinds.sort();
        assert_eq!(kinds, vec!["like", "match"]);
    }

    struct SlowNotifier(Duration);

    #[async_trait]
    impl PushNotifier for SlowNotifier {
        async fn notify_like(&self, _: UserId, _: UserId) -> Result<(), NotifierError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }

        async fn notify_match(&self, _: UserId, _: UserId) -> Result<(), NotifierError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_push_gateway_does_not_hold_up_swipes() {
        let (engine, bus, a, b) = seeded(SlowNotifier(Duration::from_secs(5))).await;
        let mut a_rooms = bus.subscribe_user_rooms(a);

        let started = Instant::now();
        engine.record_swipe(a, b, SwipeAction::Like).await.unwrap();
        let outcome = engine.record_swipe(b, a, SwipeAction::Like).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());

        let room_id = outcome.room_id.unwrap();
        assert_eq!(
            a_rooms.recv().await,
            Some(Delivery::Event(RoomListEvent::RoomCreated { room_id, peer_id: b }))
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn self_swipe_and_duplicates_are_rejected() {
        let mut notifier = MockPushNotifier::new();
        notifier.expect_notify_like().returning(|_, _| Ok(()));

        let (engine, _bus, a, b) = seeded(notifier).await;
        assert!(matches!(
            engine.record_swipe(a, a, SwipeAction::Like).await,
            Err(EngineError::Validation(_))
        ));

        engine.record_swipe(a, b, SwipeAction::Pass).await.unwrap();
        assert!(matches!(
            engine.record_swipe(a, b, SwipeAction::Like).await,
            Err(EngineError::DuplicateSwipe { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let (engine, _bus, a, _) = seeded(MockPushNotifier::new()).await;
        let err = engine
            .record_swipe(a, Uuid::now_v7(), SwipeAction::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound("profile")));
    }
}
