//! Who is connected right now.
//!
//! Each live connection is an entry keyed by `(user, connection key)`, so a
//! user with two tabs open stays online when one closes. Entries carry the
//! monotonic instant of their last activity and are swept once they go quiet
//! for longer than the configured timeout.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use axum::{Json, debug_handler, extract::State};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::{
    AppResult,
    bus::{BusEvent, PresenceEvent, RealtimeBus},
    models::UserId,
    session::CurrentUser,
};

#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    timeout: Duration,
    connections: DashMap<UserId, HashMap<String, Instant>>,
    bus: RealtimeBus,
}

impl PresenceTracker {
    pub fn new(bus: RealtimeBus, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                timeout,
                connections: DashMap::new(),
                bus,
            }),
        }
    }

    /// Registers a connection. Returns true when this brought the user online.
    pub fn join(&self, user_id: UserId, connection_key: impl Into<String>) -> bool {
        self.join_at(user_id, connection_key.into(), Instant::now())
    }

    fn join_at(&self, user_id: UserId, connection_key: String, now: Instant) -> bool {
        let came_online = {
            let mut conns = self.inner.connections.entry(user_id).or_default();
            let was_empty = conns.is_empty();
            conns.insert(connection_key, now);
            was_empty
        };

        if came_online {
            debug!(%user_id, "user online");
            self.inner.bus.publish(BusEvent::Presence(PresenceEvent::Online { user_id }));
        }
        came_online
    }

    /// Refreshes a connection's activity. Returns false for an unknown
    /// connection, which the caller should treat as a fresh join.
    pub fn heartbeat(&self, user_id: UserId, connection_key: &str) -> bool {
        self.heartbeat_at(user_id, connection_key, Instant::now())
    }

    fn heartbeat_at(&self, user_id: UserId, connection_key: &str, now: Instant) -> bool {
        let Some(mut conns) = self.inner.connections.get_mut(&user_id) else {
            return false;
        };
        match conns.get_mut(connection_key) {
            Some(seen) => {
                *seen = now;
                true
            }
            None => false,
        }
    }

    /// Drops a connection. Returns true when this took the user offline.
    pub fn leave(&self, user_id: UserId, connection_key: &str) -> bool {
        let went_offline = match self.inner.connections.entry(user_id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().remove(connection_key);
                if entry.get().is_empty() {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        if went_offline {
            debug!(%user_id, "user offline");
            self.inner.bus.publish(BusEvent::Presence(PresenceEvent::Offline { user_id }));
        }
        went_offline
    }

    pub fn snapshot(&self) -> HashSet<UserId> {
        self.inner.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.inner.connections.contains_key(&user_id)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.inner.connections.get(&user_id).map_or(0, |conns| conns.len())
    }

    /// Drops connections idle past the timeout as of `now`; returns the users
    /// that went offline as a result.
    pub fn sweep(&self, now: Instant) -> Vec<UserId> {
        let timeout = self.inner.timeout;
        let mut offline = Vec::new();

        self.inner.connections.retain(|user_id, conns| {
            conns.retain(|_, seen| now.saturating_duration_since(*seen) < timeout);
            if conns.is_empty() {
                offline.push(*user_id);
                false
            } else {
                true
            }
        });

        for user_id in &offline {
            warn!(%user_id, "presence timed out");
            self.inner
                .bus
                .publish(BusEvent::Presence(PresenceEvent::Offline { user_id: *user_id }));
        }
        offline
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                tracker.sweep(Instant::now());
            }
        })
    }
}

#[debug_handler(state = crate::AppState)]
pub async fn online(
    CurrentUser(_): CurrentUser,
    State(presence): State<PresenceTracker>,
) -> AppResult<Json<Vec<UserId>>> {
    let mut online: Vec<UserId> = presence.snapshot().into_iter().collect();
    online.sort();
    Ok(Json(online))
}
