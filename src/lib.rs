pub mod appresult;
pub mod auth;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notifier;
pub mod presence;
pub mod profiles;
pub mod rooms;
pub mod session;
pub mod swipes;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    routing::get,
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

pub use appresult::{AppError, AppResult};

use auth::{IdentityProvider, StaticTokens};
use bus::RealtimeBus;
use config::Settings;
use notifier::PushNotifier;
use presence::PresenceTracker;
use profiles::ProfileFeed;
use rooms::ConversationRooms;
use swipes::{MatchCoordinator, SwipeEngine};

/// Every component is a cheap handle; handlers pull what they need through
/// `FromRef`.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub settings: Arc<Settings>,
    pub identity: Arc<dyn IdentityProvider>,
    pub bus: RealtimeBus,
    pub presence: PresenceTracker,
    pub feed: ProfileFeed,
    pub matches: MatchCoordinator,
    pub swipes: SwipeEngine,
    pub rooms: ConversationRooms,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, settings: Settings, notifier: Arc<dyn PushNotifier>) -> Self {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(StaticTokens::from(settings.identity.tokens.clone()));
        Self::with_identity(db_pool, settings, notifier, identity)
    }

    pub fn with_identity(
        db_pool: SqlitePool,
        settings: Settings,
        notifier: Arc<dyn PushNotifier>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let bus = RealtimeBus::new(settings.bus.channel_capacity);
        let presence = PresenceTracker::new(bus.clone(), settings.presence.timeout());
        let feed = ProfileFeed::new(db_pool.clone(), settings.feed.clone());
        let matches = MatchCoordinator::new(db_pool.clone(), bus.clone(), notifier.clone());
        let swipes = SwipeEngine::new(db_pool.clone(), matches.clone(), notifier);
        let rooms = ConversationRooms::new(db_pool.clone(), bus.clone(), settings.rooms.clone());

        Self {
            db_pool,
            settings: Arc::new(settings),
            identity,
            bus,
            presence,
            feed,
            matches,
            swipes,
            rooms,
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            app_state.settings.session_inactivity_minutes,
        )));

    Router::new()
        .route("/health", get(health))
        .route("/presence", get(presence::online))
        .merge(auth::router())
        .merge(profiles::router())
        .merge(swipes::router())
        .merge(rooms::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> StatusCode {
    StatusCode::OK
}
