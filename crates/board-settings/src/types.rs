//! Settings types.
//!
//! All structs use `#[serde(default)]` so a partial settings file only needs
//! the keys it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Live chat hub settings.
    pub chat: ChatSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl BoardSettings {
    /// Reject combinations the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chat.mailbox_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "chat.mailboxCapacity must be > 0".into(),
            ));
        }
        if self.chat.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "chat.heartbeatIntervalSecs must be > 0".into(),
            ));
        }
        if self.chat.heartbeat_timeout_secs < self.chat.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "chat.heartbeatTimeoutSecs ({}) must be >= chat.heartbeatIntervalSecs ({})",
                self.chat.heartbeat_timeout_secs, self.chat.heartbeat_interval_secs
            )));
        }
        if self.chat.max_message_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "chat.maxMessageBytes must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Browser origins allowed by CORS, matched by prefix.
    pub allowed_origin_prefixes: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origin_prefixes: vec!["http://localhost:".to_string()],
        }
    }
}

/// Live chat hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Outbound mailbox slots per connection.
    pub mailbox_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of peer silence before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_bytes: usize,
}

impl ChatSettings {
    /// Ping interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_bytes: 64 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}
