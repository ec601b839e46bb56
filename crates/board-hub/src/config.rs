//! Runtime configuration for the hub server.

use std::time::Duration;

use board_settings::BoardSettings;

/// Everything the server and its sessions need at runtime.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Outbound mailbox slots per connection.
    pub mailbox_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Peer silence tolerated before the session is dropped.
    pub heartbeat_timeout: Duration,
    /// Largest inbound message or frame, in bytes.
    pub max_message_bytes: usize,
    /// CORS origins allowed by prefix.
    pub allowed_origin_prefixes: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&BoardSettings::default())
    }
}

impl From<&BoardSettings> for HubConfig {
    fn from(settings: &BoardSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            mailbox_capacity: settings.chat.mailbox_capacity,
            heartbeat_interval: settings.chat.heartbeat_interval(),
            heartbeat_timeout: settings.chat.heartbeat_timeout(),
            max_message_bytes: settings.chat.max_message_bytes,
            allowed_origin_prefixes: settings.server.allowed_origin_prefixes.clone(),
        }
    }
}

impl HubConfig {
    /// Loopback on an ephemeral port, otherwise defaults.
    pub fn local() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::default()
        }
    }
}
