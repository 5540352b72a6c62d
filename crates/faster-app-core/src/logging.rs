//! Logging integration for faster-app.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-request spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log.level`. `settings.log.format` picks
/// `pretty` or `json` output; when empty, debug mode gets the pretty format
/// and everything else gets structured JSON. Calling this more than once is
/// harmless; only the first subscriber is installed.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let pretty = match settings.log.format.as_str() {
        "pretty" => true,
        "json" => false,
        _ => settings.debug,
    };

    if pretty {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for an HTTP request.
///
/// # Examples
///
/// ```
/// use faster_app_core::logging::request_span;
///
/// let span = request_span("GET", "/notes", "abc-123");
/// let _guard = span.enter();
/// tracing::info!("handling request");
/// ```
pub fn request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!("request", %method, %path, id = request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let mut settings = Settings::default();
        settings.log.format = "json".to_string();
        setup_logging(&settings);
        settings.log.level = "not a [valid filter".to_string();
        setup_logging(&settings);
    }
}
