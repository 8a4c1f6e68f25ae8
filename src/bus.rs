//! Realtime fan-out.
//!
//! One `tokio::sync::broadcast` channel per topic: per room, per user's room
//! list, and a single presence channel. Channels are created on first
//! subscription and dropped once a publish finds nobody listening. Events are
//! notifications only; consumers re-fetch from the store when in doubt.

use std::{hash::Hash, sync::Arc};

use dashmap::DashMap;
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::models::{Message, Millis, RoomId, TypingState, UserId};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RoomEvent {
    #[serde(rename = "message.created")]
    MessageCreated { message: Message },
    #[serde(rename = "message.updated")]
    MessageUpdated { message: Message },
    #[serde(rename = "typing.changed")]
    TypingChanged { typing: TypingState },
    #[serde(rename = "room.removed")]
    RoomRemoved { room_id: RoomId },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RoomListEvent {
    #[serde(rename = "room.created")]
    RoomCreated { room_id: RoomId, peer_id: UserId },
    #[serde(rename = "room.updated")]
    RoomUpdated {
        room_id: RoomId,
        last_activity_at: Millis,
    },
    #[serde(rename = "room.removed")]
    RoomRemoved { room_id: RoomId },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum PresenceEvent {
    #[serde(rename = "presence.online")]
    Online { user_id: UserId },
    #[serde(rename = "presence.offline")]
    Offline { user_id: UserId },
}

#[derive(Debug, Clone)]
pub enum BusEvent {
    Room(RoomId, RoomEvent),
    UserRooms(UserId, RoomListEvent),
    Presence(PresenceEvent),
}

/// What a subscriber gets out of [`Subscription::recv`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<E> {
    Event(E),
    /// The subscriber fell behind and `missed` events were dropped; it should
    /// re-fetch full state before trusting the stream again.
    Resync { missed: u64 },
}

pub struct Subscription<E> {
    rx: broadcast::Receiver<E>,
    topic: String,
}

impl<E: Clone> Subscription<E> {
    /// Next delivery, or `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<Delivery<E>> {
        match self.rx.recv().await {
            Ok(event) => Some(Delivery::Event(event)),
            Err(RecvError::Lagged(missed)) => {
                warn!(topic = %self.topic, missed, "subscriber lagged, asking for resync");
                Some(Delivery::Resync { missed })
            }
            Err(RecvError::Closed) => None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn into_stream(self) -> impl Stream<Item = Delivery<E>>
    where
        E: Send + 'static,
    {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|delivery| (delivery, sub))
        })
    }
}

#[derive(Clone)]
pub struct RealtimeBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    capacity: usize,
    rooms: DashMap<RoomId, broadcast::Sender<RoomEvent>>,
    user_rooms: DashMap<UserId, broadcast::Sender<RoomListEvent>>,
    presence: broadcast::Sender<PresenceEvent>,
}

impl RealtimeBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(BusInner {
                capacity,
                rooms: DashMap::new(),
                user_rooms: DashMap::new(),
                presence: broadcast::channel(capacity).0,
            }),
        }
    }

    /// Room membership is checked by the caller.
    pub fn subscribe_room(
        &self,
        room_id: RoomId,
        subscriber_id: UserId,
    ) -> Subscription<RoomEvent> {
        debug!(%room_id, %subscriber_id, "room subscription");
        Subscription {
            rx: subscribe(&self.inner.rooms, room_id, self.inner.capacity),
            topic: format!("room:{room_id}"),
        }
    }

    pub fn subscribe_user_rooms(&self, user_id: UserId) -> Subscription<RoomListEvent> {
        Subscription {
            rx: subscribe(&self.inner.user_rooms, user_id, self.inner.capacity),
            topic: format!("user-rooms:{user_id}"),
        }
    }

    pub fn subscribe_presence(&self) -> Subscription<PresenceEvent> {
        Subscription {
            rx: self.inner.presence.subscribe(),
            topic: "presence".to_owned(),
        }
    }

    /// Returns how many live subscriptions the event reached.
    pub fn publish(&self, event: BusEvent) -> usize {
        match event {
            BusEvent::Room(room_id, event) => send(&self.inner.rooms, room_id, event),
            BusEvent::UserRooms(user_id, event) => send(&self.inner.user_rooms, user_id, event),
            BusEvent::Presence(event) => self.inner.presence.send(event).unwrap_or(0),
        }
    }

    pub fn room_topic_count(&self) -> usize {
        self.inner.rooms.len()
    }
}

fn subscribe<K, E>(
    topics: &DashMap<K, broadcast::Sender<E>>,
    key: K,
    capacity: usize,
) -> broadcast::Receiver<E>
where
    K: Eq + Hash,
    E: Clone,
{
    topics
        .entry(key)
        .or_insert_with(|| broadcast::channel(capacity).0)
        .subscribe()
}

fn send<K, E>(topics: &DashMap<K, broadcast::Sender<E>>, key: K, event: E) -> usize
where
    K: Eq + Hash,
    E: Clone,
{
    let Some(tx) = topics.get(&key).map(|tx| tx.value().clone()) else {
        return 0;
    };

    match tx.send(event) {
        Ok(reached) => reached,
        Err(_) => {
            topics.remove_if(&key, |_, tx| tx.receiver_count() == 0);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use uuid::Uuid;

    fn removed(room_id: RoomId) -> RoomEvent {
        RoomEvent::RoomRemoved { room_id }
    }

    #[tokio::test]
    async fn delivers_in_publish_order_per_topic() {
        let bus = RealtimeBus::new(16);
        let room = Uuid::now_v7();
        let mut sub = bus.subscribe_room(room, Uuid::now_v7());

        let ids: Vec<RoomId> = (0..5).map(|_| Uuid::now_v7()).collect();
        for id in &ids {
            bus.publish(BusEvent::Room(room, removed(*id)));
        }

        for id in ids {
            assert_eq!(sub.recv().await, Some(Delivery::Event(removed(id))));
        }
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = RealtimeBus::new(16);
        let (room_a, room_b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut sub_a = bus.subscribe_room(room_a, Uuid::now_v7());
        let _sub_b = bus.subscribe_room(room_b, Uuid::now_v7());

        assert_eq!(bus.publish(BusEvent::Room(room_b, removed(room_b))), 1);
        assert_eq!(bus.publish(BusEvent::Room(room_a, removed(room_a))), 1);
        assert_eq!(sub_a.recv().await, Some(Delivery::Event(removed(room_a))));
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_resync() {
        let bus = RealtimeBus::new(2);
        let room = Uuid::now_v7();
        let mut sub = bus.subscribe_room(room, Uuid::now_v7());

        for _ in 0..5 {
            bus.publish(BusEvent::Room(room, removed(room)));
        }

        assert_eq!(sub.recv().await, Some(Delivery::Resync { missed: 3 }));
        assert_eq!(sub.recv().await, Some(Delivery::Event(removed(room))));
    }

    #[tokio::test]
    async fn dropping_last_subscriber_retires_topic() {
        let bus = RealtimeBus::new(4);
        let room = Uuid::now_v7();
        let sub = bus.subscribe_room(room, Uuid::now_v7());
        assert_eq!(bus.room_topic_count(), 1);

        drop(sub);
        assert_eq!(bus.publish(BusEvent::Room(room, removed(room))), 0);
        assert_eq!(bus.room_topic_count(), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_harmless() {
        let bus = RealtimeBus::new(4);
        let user = Uuid::now_v7();
        let reached = bus.publish(BusEvent::UserRooms(
            user,
            RoomListEvent::RoomRemoved { room_id: user },
        ));
        assert_eq!(reached, 0);
        assert_eq!(bus.publish(BusEvent::Presence(PresenceEvent::Online { user_id: user })), 0);
    }

    #[tokio::test]
    async fn stream_yields_presence_events() {
        let bus = RealtimeBus::new(4);
        let user = Uuid::now_v7();
        let stream = bus.subscribe_presence().into_stream();
        bus.publish(BusEvent::Presence(PresenceEvent::Online { user_id: user }));
        bus.publish(BusEvent::Presence(PresenceEvent::Offline { user_id: user }));

        let got: Vec<_> = stream.take(2).collect().await;
        assert_eq!(
            got,
            vec![
                Delivery::Event(PresenceEvent::Online { user_id: user }),
                Delivery::Event(PresenceEvent::Offline { user_id: user }),
            ]
        );
    }

    #[test]
    fn events_serialize_with_dotted_type() {
        let room_id = Uuid::nil();
        let json = serde_json::to_value(RoomEvent::RoomRemoved { room_id }).unwrap();
        assert_eq!(json["type"], "room.removed");
        assert_eq!(json["room_id"], room_id.to_string());
    }
}
