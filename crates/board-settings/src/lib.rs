//! # board-settings
//!
//! Configuration for the board chat hub, loaded from three layers
//! (lowest to highest priority):
//! 1. **Compiled defaults**: [`BoardSettings::default()`]
//! 2. **Settings file**: `~/.board/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `BOARD_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{BoardSettings, ChatSettings, LoggingSettings, ServerSettings};
