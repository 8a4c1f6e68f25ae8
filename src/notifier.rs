//! Push notification port.
//!
//! Delivery is someone else's job; the engine only says "u1 liked u2" or
//! "u1 and u2 matched". Failures never fail the operation that triggered them.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::UserId;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification endpoint answered {0}")]
    Rejected(u16),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify_like(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
    ) -> Result<(), NotifierError>;

    async fn notify_match(&self, user_a: UserId, user_b: UserId) -> Result<(), NotifierError>;
}

/// Logs notifications instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PushNotifier for LogNotifier {
    async fn notify_like(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
    ) -> Result<(), NotifierError> {
        info!(%from_user_id, %to_user_id, "like notification");
        Ok(())
    }

    async fn notify_match(&self, user_a: UserId, user_b: UserId) -> Result<(), NotifierError> {
        info!(%user_a, %user_b, "match notification");
        Ok(())
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Notification {
    Like { from_user_id: UserId, to_user_id: UserId },
    Match { user_a_id: UserId, user_b_id: UserId },
}

/// Posts each notification as JSON to a push gateway.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    async fn post(&self, notification: &Notification) -> Result<(), NotifierError> {
        let status = self
            .http_client
            .post(&self.url)
            .json(notification)
            .send()
            .await?
            .status();

        if status.is_success() {
            Ok(())
        } else {
            Err(NotifierError::Rejected(status.as_u16()))
        }
    }
}

#[async_trait]
impl PushNotifier for WebhookNotifier {
    async fn notify_like(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
    ) -> Result<(), NotifierError> {
        self.post(&Notification::Like { from_user_id, to_user_id }).await
    }

    async fn notify_match(&self, user_a: UserId, user_b: UserId) -> Result<(), NotifierError> {
        self.post(&Notification::Match {
            user_a_id: user_a,
            user_b_id: user_b,
        })
        .await
    }
}

/// Sends the like notification on its own task. The swipe that triggered it
/// never waits on the push gateway.
pub(crate) fn spawn_like(
    notifier: Arc<dyn PushNotifier>,
    from_user_id: UserId,
    to_user_id: UserId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify_like(from_user_id, to_user_id).await {
            warn!(%from_user_id, %to_user_id, error = %err, "like notification failed");
        }
    })
}

pub(crate) fn spawn_match(
    notifier: Arc<dyn PushNotifier>,
    user_a: UserId,
    user_b: UserId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify_match(user_a, user_b).await {
            warn!(%user_a, %user_b, error = %err, "match notification failed");
        }
    })
}
