//! # ragchat-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RagChatSettings::default()`]
//! 2. **Settings file**: `~/.ragchat/settings.json` or an explicit path, deep-merged over defaults
//! 3. **Environment variables**: `RAGCHAT_*`, `ANTHROPIC_API_KEY` and `ES_*` overrides
//!
//! ```no_run
//! use ragchat_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_file, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
