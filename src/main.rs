use std::sync::Arc;

use rishiconnect::{
    AppState, app,
    config::{LogFormat, Settings},
    db,
    notifier::{LogNotifier, PushNotifier, WebhookNotifier},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let settings = Settings::load()?;
    init_tracing(&settings);
    if !settings.sign_in_enabled() {
        warn!("no identity tokens configured, nobody can sign in");
    }

    let db_pool = db::connect(&settings.database_url, settings.max_connections).await?;

    let notifier: Arc<dyn PushNotifier> = match &settings.notifier.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), settings.notifier.timeout())?),
        None => Arc::new(LogNotifier),
    };

    let addr = settings.socket_addr()?;
    let sweep_every = settings.presence.sweep_interval();

    let app_state = AppState::new(db_pool, settings, notifier);
    let sweeper = app_state.presence.spawn_sweeper(sweep_every);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("shut down");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match settings.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
