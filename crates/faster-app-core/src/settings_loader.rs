//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (deep-merged over the defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `FASTER_APP_PROJECT_NAME` | `project_name` |
//! | `FASTER_APP_DEBUG` | `debug` |
//! | `FASTER_APP_SECRET_KEY` | `secret_key` |
//! | `FASTER_APP_JWT_SECRET` | `jwt.secret_key` |
//! | `FASTER_APP_LOG_LEVEL` | `log.level` |
//! | `FASTER_APP_HOST` | `server.host` |
//! | `FASTER_APP_PORT` | `server.port` |
//! | `FASTER_APP_VALIDATE_ROUTES` | `validate_routes` |
//! | `FASTER_APP_ROUTE_VALIDATION` | `route_validation` (`strict` / `permissive`) |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use faster_app_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/settings.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::AppError;
use crate::settings::{RouteValidationMode, Settings};

/// Loads settings from a TOML string.
///
/// Missing keys keep their default values, including keys inside nested
/// tables.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, AppError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| AppError::improperly_configured(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, AppError> {
    from_toml_str(&read_file(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, AppError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, AppError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| AppError::improperly_configured(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, AppError> {
    from_json_str(&read_file(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, AppError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Applies overrides from an arbitrary lookup; lets tests avoid touching the
/// process environment.
fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("FASTER_APP_PROJECT_NAME") {
        settings.project_name = val;
    }

    if let Some(val) = lookup("FASTER_APP_DEBUG") {
        settings.debug = parse_bool(&val);
    }

    if let Some(val) = lookup("FASTER_APP_SECRET_KEY") {
        settings.secret_key = val;
    }

    if let Some(val) = lookup("FASTER_APP_JWT_SECRET") {
        settings.jwt.secret_key = val;
    }

    if let Some(val) = lookup("FASTER_APP_LOG_LEVEL") {
        settings.log.level = val;
    }

    if let Some(val) = lookup("FASTER_APP_HOST") {
        settings.server.host = val;
    }

    if let Some(val) = lookup("FASTER_APP_PORT") {
        match val.parse::<u16>() {
            Ok(port) => settings.server.port = port,
            Err(_) => tracing::warn!(value = %val, "ignoring invalid FASTER_APP_PORT"),
        }
    }

    if let Some(val) = lookup("FASTER_APP_VALIDATE_ROUTES") {
        settings.validate_routes = parse_bool(&val);
    }

    if let Some(val) = lookup("FASTER_APP_ROUTE_VALIDATION") {
        match val.to_lowercase().as_str() {
            "strict" => settings.route_validation = RouteValidationMode::Strict,
            "permissive" => settings.route_validation = RouteValidationMode::Permissive,
            other => tracing::warn!(value = other, "ignoring unknown route validation mode"),
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn read_file(path: &Path, kind: &str) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::improperly_configured(format!(
            "Failed to read {kind} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, kind: &str) -> Result<Settings, AppError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        AppError::improperly_configured(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        AppError::improperly_configured(format!("Failed to deserialize settings from {kind}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
