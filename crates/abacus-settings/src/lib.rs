//! # abacus-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AbacusSettings::default()`]
//! 2. **User file**: `~/.abacus/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ABACUS_*` plus the conventional `PORT`,
//!    `NODE_ENV`, `ALLOWED_HOSTS`, `ALLOWED_ORIGINS`, `CORS_ORIGIN` (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
