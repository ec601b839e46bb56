//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BoardSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `BOARD_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::BoardSettings;

/// Resolve the default settings file (`~/.board/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".board").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BoardSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<BoardSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<BoardSettings> {
    let defaults = serde_json::to_value(BoardSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `BOARD_*` environment variables to loaded settings.
pub fn apply_env_overrides(settings: &mut BoardSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Numbers must parse and fall inside their range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is logged
/// and ignored, leaving the file/default value in place.
pub fn apply_overrides(settings: &mut BoardSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("BOARD_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number::<u16>("BOARD_PORT", 0, u16::MAX) {
        settings.server.port = v;
    }

    // ── Chat hub ────────────────────────────────────────────────────
    if let Some(v) = env.number::<usize>("BOARD_MAILBOX_CAPACITY", 1, 65_536) {
        settings.chat.mailbox_capacity = v;
    }
    if let Some(v) = env.number::<u64>("BOARD_HEARTBEAT_INTERVAL_SECS", 1, 3_600) {
        settings.chat.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.number::<u64>("BOARD_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
        settings.chat.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.number::<usize>("BOARD_MAX_MESSAGE_BYTES", 256, 16 * 1024 * 1024) {
        settings.chat.max_message_bytes = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("BOARD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.boolean("BOARD_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn boolean(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn number<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = (self.lookup)(name)?;
        let result = parse_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
