use std::{collections::HashMap, net::SocketAddr, time::Duration};

use serde::Deserialize;
use uuid::Uuid;

/// Process configuration. Read from an optional `rishiconnect.toml`, then
/// `RISHICONNECT__*` environment variables (`RISHICONNECT__FEED__MAX_LIMIT=50`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub log_format: LogFormat,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_session_inactivity_minutes")]
    pub session_inactivity_minutes: i64,

    #[serde(default)]
    pub feed: FeedSettings,

    #[serde(default)]
    pub rooms: RoomSettings,

    #[serde(default)]
    pub presence: PresenceSettings,

    #[serde(default)]
    pub bus: BusSettings,

    #[serde(default)]
    pub notifier: NotifierSettings,

    #[serde(default)]
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_feed_limit")]
    pub default_limit: u32,
    #[serde(default = "default_feed_max_limit")]
    pub max_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomSettings {
    /// In characters.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    #[serde(default = "default_preview_len")]
    pub preview_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    #[serde(default = "default_presence_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_presence_sweep_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusSettings {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    /// Push gateway endpoint. Notifications are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notifier_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentitySettings {
    /// Bearer token → user id, as issued by the identity provider.
    #[serde(default)]
    pub tokens: HashMap<String, Uuid>,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("rishiconnect").required(false))
            .add_source(config::Environment::with_prefix("RISHICONNECT").separator("__"));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// False when no identity tokens are configured and nobody can sign in.
    pub fn sign_in_enabled(&self) -> bool {
        !self.identity.tokens.is_empty()
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            session_inactivity_minutes: default_session_inactivity_minutes(),
            feed: FeedSettings::default(),
            rooms: RoomSettings::default(),
            presence: PresenceSettings::default(),
            bus: BusSettings::default(),
            notifier: NotifierSettings::default(),
            identity: IdentitySettings::default(),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            default_limit: default_feed_limit(),
            max_limit: default_feed_max_limit(),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_message_len: default_max_message_len(),
            preview_len: default_preview_len(),
        }
    }
}

impl PresenceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_presence_timeout_secs(),
            sweep_interval_secs: default_presence_sweep_secs(),
        }
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl NotifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notifier_timeout_secs(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://rishiconnect.db".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_inactivity_minutes() -> i64 {
    60 * 24
}

fn default_feed_limit() -> u32 {
    20
}

fn default_feed_max_limit() -> u32 {
    100
}

fn default_max_message_len() -> usize {
    4000
}

fn default_preview_len() -> usize {
    80
}

fn default_presence_timeout_secs() -> u64 {
    45
}

fn default_presence_sweep_secs() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    256
}

fn default_notifier_timeout_secs() -> u64 {
    5
}
