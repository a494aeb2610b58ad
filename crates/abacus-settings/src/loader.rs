//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AbacusSettings::default()`]
//! 2. If `~/.abacus/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AbacusSettings, Environment};

/// Resolve the path to the settings file (`~/.abacus/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".abacus").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AbacusSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<AbacusSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
fn load_file_layer(path: &Path) -> Result<AbacusSettings> {
    let defaults = serde_json::to_value(AbacusSettings::default())?;

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
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut AbacusSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Split out from [`apply_env_overrides`] so tests can inject variables
/// without touching the process environment.
pub fn apply_overrides(settings: &mut AbacusSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("ABACUS_HOST") {
        settings.server.host = v;
    }
    // ABACUS_PORT wins over the conventional PORT
    for name in ["PORT", "ABACUS_PORT"] {
        if let Some(raw) = read(name) {
            match parse_u16_range(&raw, 1, 65535) {
                Some(port) => settings.server.port = port,
                None => warn_invalid(name, &raw),
            }
        }
    }
    for name in ["NODE_ENV", "ABACUS_ENV"] {
        if let Some(raw) = read(name) {
            match Environment::parse(&raw) {
                Some(env) => settings.server.environment = env,
                None => warn_invalid(name, &raw),
            }
        }
    }
    if let Some(raw) = read("ABACUS_MAX_BODY_BYTES") {
        match parse_usize_range(&raw, 1024, 1_073_741_824) {
            Some(v) => settings.server.max_body_bytes = v,
            None => warn_invalid("ABACUS_MAX_BODY_BYTES", &raw),
        }
    }
    if let Some(v) = read("CORS_ORIGIN") {
        settings.server.cors_origin = v;
    }

    // ── Security ────────────────────────────────────────────────────
    if let Some(raw) = read("ALLOWED_HOSTS") {
        settings.security.allowed_hosts = Some(parse_list(&raw));
    }
    if let Some(raw) = read("ALLOWED_ORIGINS") {
        settings.security.allowed_origins = Some(parse_list(&raw));
    }
    if let Some(raw) = read("ABACUS_ENFORCE_ALLOW_LIST") {
        match parse_bool(&raw) {
            Some(v) => settings.security.enforce = Some(v),
            None => warn_invalid("ABACUS_ENFORCE_ALLOW_LIST", &raw),
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    if let Some(raw) = read("ABACUS_SHUTDOWN_GRACE_MS") {
        match parse_u64_range(&raw, 0, 600_000) {
            Some(v) => settings.shutdown.grace_period_ms = v,
            None => warn_invalid("ABACUS_SHUTDOWN_GRACE_MS", &raw),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("ABACUS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("ABACUS_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

fn warn_invalid(name: &str, value: &str) {
    tracing::warn!(key = name, value, "invalid env var, ignoring");
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
