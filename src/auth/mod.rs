use std::collections::HashMap;

use async_trait::async_trait;
use axum::{Router, routing::post};

use crate::{AppState, models::UserId};

mod login;
mod logout;

pub use login::login;
pub use logout::logout;

/// Resolves a credential issued elsewhere to a user id. The engine never
/// checks passwords itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, UserId>,
}

impl From<HashMap<String, UserId>> for StaticTokens {
    fn from(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn verify(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
}
