//! Settings for faster-app.
//!
//! [`Settings`] holds every knob the toolkit reads at runtime, grouped in
//! nested sections that map one-to-one onto TOML tables. [`LazySettings`] is a
//! write-once, process-wide slot the server fills at startup so that
//! components without an explicit configuration (rate throttles, for one) can
//! still resolve their defaults.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The placeholder secret shipped in default settings.
pub const DEFAULT_SECRET_KEY: &str = "change-me-in-production";

/// How route conflicts found at startup are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteValidationMode {
    /// Conflicts abort startup.
    #[default]
    Strict,
    /// Conflicts are logged and startup continues.
    Permissive,
}

/// Listening address configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// JSON Web Token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// Signing secret. Empty means "use the top-level `secret_key`".
    pub secret_key: String,
    /// One of `HS256`, `HS384`, `HS512`.
    pub algorithm: String,
    /// Lifetime of issued access tokens.
    pub access_token_expire_minutes: i64,
    /// Clock skew tolerated when checking `exp` and `nbf`.
    pub leeway_secs: i64,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            leeway_secs: 0,
        }
    }
}

/// Logging configuration consumed by [`crate::logging::setup_logging`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// An `EnvFilter` directive such as `info` or `faster_app=debug,info`.
    pub level: String,
    /// `pretty`, `json`, or empty to pick by `debug`.
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: String::new(),
        }
    }
}

/// Timeouts applied to application lifecycle hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifespanSettings {
    /// Upper bound for each `on_startup` hook.
    pub startup_timeout_secs: u64,
    /// Upper bound for each `on_shutdown` hook.
    pub shutdown_timeout_secs: u64,
}

impl Default for LifespanSettings {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 30,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Rates keyed by scope, e.g. `user = "100/hour"`.
    pub rates: HashMap<String, String>,
    /// How often the background sweeper drops stale buckets. Zero disables it.
    pub sweep_interval_secs: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        let rates = [("user", "100/hour"), ("anon", "20/hour"), ("default", "100/hour")]
            .into_iter()
            .map(|(scope, rate)| (scope.to_string(), rate.to_string()))
            .collect();
        Self {
            rates,
            sweep_interval_secs: 300,
        }
    }
}

/// Page size limits for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Page size used when the client does not send `size`.
    pub default_size: usize,
    /// Largest accepted `size`.
    pub max_size: usize,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 100,
        }
    }
}

/// Request timing middleware options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Adds `X-Process-Time` and logs slow requests.
    pub enabled: bool,
    /// Requests slower than this are logged at `warn`.
    pub slow_threshold_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_threshold_ms: 1000,
        }
    }
}

/// Toggles for the builtin middleware stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareSettings {
    /// Timing middleware.
    pub timing: TimingSettings,
    /// One `info` line per request.
    pub request_logging: bool,
    /// Conservative security headers on every response.
    pub security_headers: bool,
    /// Permissive CORS layer.
    pub cors: bool,
    /// Response compression layer.
    pub compression: bool,
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            timing: TimingSettings::default(),
            request_logging: true,
            security_headers: false,
            cors: false,
            compression: false,
        }
    }
}

/// The full set of faster-app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Project ──────────────────────────────────────────────────────

    /// Name reported by the root endpoint.
    pub project_name: String,
    /// Version reported by the root and health endpoints.
    pub version: String,
    /// Debug mode exposes error details in responses.
    pub debug: bool,
    /// Secret used for signing when no more specific secret is set.
    pub secret_key: String,

    // ── Routing ──────────────────────────────────────────────────────

    /// Runs the route validator before serving.
    pub validate_routes: bool,
    /// What to do with conflicts the validator finds.
    pub route_validation: RouteValidationMode,

    // ── Sections ─────────────────────────────────────────────────────

    /// Listening address.
    pub server: ServerSettings,
    /// Token authentication.
    pub jwt: JwtSettings,
    /// Logging.
    pub log: LogSettings,
    /// Lifecycle hook timeouts.
    pub lifespan: LifespanSettings,
    /// Rate limits.
    pub throttle: ThrottleSettings,
    /// Page sizes.
    pub pagination: PaginationSettings,
    /// Builtin middleware toggles.
    pub middleware: MiddlewareSettings,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "faster-app".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug: true,
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            validate_routes: true,
            route_validation: RouteValidationMode::Strict,
            server: ServerSettings::default(),
            jwt: JwtSettings::default(),
            log: LogSettings::default(),
            lifespan: LifespanSettings::default(),
            throttle: ThrottleSettings::default(),
            pagination: PaginationSettings::default(),
            middleware: MiddlewareSettings::default(),
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns the secret used to sign and verify JWTs.
    pub fn jwt_secret(&self) -> &str {
        if self.jwt.secret_key.is_empty() {
            &self.secret_key
        } else {
            &self.jwt.secret_key
        }
    }

    /// Looks up the configured rate for a throttle scope.
    pub fn throttle_rate(&self, scope: &str) -> Option<&str> {
        self.throttle.rates.get(scope).map(String::as_str)
    }

    /// Refuses to run a non-debug deployment with the placeholder secret.
    pub fn check_production(&self) -> Result<(), AppError> {
        if !self.debug && (self.secret_key.is_empty() || self.secret_key == DEFAULT_SECRET_KEY) {
            return Err(AppError::improperly_configured(
                "secret_key must be changed when debug is disabled",
            ));
        }
        Ok(())
    }
}

/// A lazily-initialized, globally accessible settings container.
pub struct LazySettings {
    inner: OnceLock<Settings>,
    fallback: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
            fallback: OnceLock::new(),
        }
    }

    /// Configures the global settings. Only the first call wins.
    ///
    /// Returns `false` if settings were already configured.
    pub fn configure(&self, settings: Settings) -> bool {
        self.inner.set(settings).is_ok()
    }

    /// Returns the configured settings, if any.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns the configured settings, or defaults when nothing was configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .unwrap_or_else(|| self.fallback.get_or_init(Settings::default))
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert!(s.validate_routes);
        assert_eq!(s.route_validation, RouteValidationMode::Strict);
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.jwt.algorithm, "HS256");
        assert_eq!(s.jwt.access_token_expire_minutes, 30);
        assert_eq!(s.log.level, "info");
        assert_eq!(s.lifespan.startup_timeout_secs, 30);
        assert_eq!(s.pagination.default_size, 20);
        assert_eq!(s.middleware.timing.slow_threshold_ms, 1000);
    }

    #[test]
    fn test_default_throttle_rates() {
        let s = Settings::default();
        assert_eq!(s.throttle_rate("user"), Some("100/hour"));
        assert_eq!(s.throttle_rate("anon"), Some("20/hour"));
        assert_eq!(s.throttle_rate("default"), Some("100/hour"));
        assert_eq!(s.throttle_rate("uploads"), None);
    }

    #[test]
    fn test_jwt_secret_falls_back_to_secret_key() {
        let mut s = Settings::default();
        s.secret_key = "top".to_string();
        assert_eq!(s.jwt_secret(), "top");
        s.jwt.secret_key = "jwt-only".to_string();
        assert_eq!(s.jwt_secret(), "jwt-only");
    }

    #[test]
    fn test_check_production() {
        let mut s = Settings::default();
        assert!(s.check_production().is_ok());
        s.debug = false;
        assert!(s.check_production().is_err());
        s.secret_key = "a-real-secret".to_string();
        assert!(s.check_production().is_ok());
    }

    #[test]
    fn test_server_addr() {
        let s = ServerSettings::default();
        assert_eq!(s.addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_lazy_settings_configure_and_get() {
        let lazy = LazySettings::new();
        assert!(!lazy.is_configured());
        assert!(lazy.try_get().is_none());
        assert!(lazy.get().debug);

        let mut settings = Settings::default();
        settings.debug = false;
        settings.secret_key = "test-secret".to_string();

        assert!(lazy.configure(settings));
        assert!(lazy.is_configured());
        assert!(!lazy.get().debug);
        assert_eq!(lazy.get().secret_key, "test-secret");
    }

    #[test]
    fn test_lazy_settings_first_configure_wins() {
        let lazy = LazySettings::new();
        let mut first = Settings::default();
        first.project_name = "first".to_string();
        assert!(lazy.configure(first));
        assert!(!lazy.configure(Settings::default()));
        assert_eq!(lazy.get().project_name, "first");
    }
}
