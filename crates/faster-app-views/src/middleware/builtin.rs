//! Built-in middleware.
//!
//! - [`RequestTimingMiddleware`] - `X-Process-Time` header and slow-request warnings
//! - [`RequestLoggingMiddleware`] - one log line per request and per response
//! - [`SecurityHeadersMiddleware`] - conservative security headers
//!
//! CORS and compression are not middleware here; the server adds the
//! `tower-http` layers for them when enabled in settings.

use std::time::Duration;

use async_trait::async_trait;
use faster_app_core::settings::MiddlewareSettings;
use faster_app_core::Settings;
use faster_app_http::{ApiResponse, RequestContext};
use http::HeaderName;

use super::{Middleware, MiddlewarePipeline};

/// Header carrying the handling time in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Longest request body prefix written to the debug log.
const BODY_LOG_LIMIT: usize = 500;

// ── RequestTimingMiddleware ─────────────────────────────────────────

/// Measures handling time from context creation to response.
#[derive(Debug, Clone)]
pub struct RequestTimingMiddleware {
    /// Requests slower than this are logged at `warn`.
    pub slow_threshold: Duration,
}

impl Default for RequestTimingMiddleware {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_secs(1),
        }
    }
}

impl RequestTimingMiddleware {
    /// Uses `threshold` as the slow-request limit.
    pub const fn new(threshold: Duration) -> Self {
        Self {
            slow_threshold: threshold,
        }
    }
}

#[async_trait]
impl Middleware for RequestTimingMiddleware {
    async fn process_response(&self, ctx: &RequestContext, response: ApiResponse) -> ApiResponse {
        let elapsed = ctx.started_at().elapsed();
        if elapsed > self.slow_threshold {
            tracing::warn!(
                method = %ctx.method(),
                path = ctx.path(),
                elapsed_ms = elapsed.as_millis(),
                threshold_ms = self.slow_threshold.as_millis(),
                "slow request"
            );
        }
        response.with_header(
            HeaderName::from_static(PROCESS_TIME_HEADER),
            &format!("{:.4}", elapsed.as_secs_f64()),
        )
    }
}

// ── RequestLoggingMiddleware ────────────────────────────────────────

/// Logs method, path, client and status of every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggingMiddleware {
    /// Also logs the first bytes of write-request bodies at `debug`.
    pub log_request_body: bool,
}

#[async_trait]
impl Middleware for RequestLoggingMiddleware {
    async fn process_request(&self, ctx: &mut RequestContext) -> Option<ApiResponse> {
        let client = ctx
            .client_addr()
            .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
        tracing::info!(
            method = %ctx.method(),
            path = ctx.path(),
            query = %ctx.query().urlencode(),
            client = %client,
            request_id = ctx.request_id(),
            "request"
        );
        if self.log_request_body && !ctx.is_read_method() && !ctx.body().is_empty() {
            let body = String::from_utf8_lossy(ctx.body());
            let preview: String = body.chars().take(BODY_LOG_LIMIT).collect();
            tracing::debug!(request_id = ctx.request_id(), body = %preview, "request body");
        }
        None
    }

    async fn process_response(&self, ctx: &RequestContext, response: ApiResponse) -> ApiResponse {
        tracing::info!(
            path = ctx.path(),
            status = response.status().as_u16(),
            request_id = ctx.request_id(),
            "response"
        );
        response
    }
}

// ── SecurityHeadersMiddleware ───────────────────────────────────────

/// Adds `nosniff`, frame denial, XSS protection and referrer policy headers.
///
/// With a non-zero `hsts_seconds` it also sends `Strict-Transport-Security`.
#[derive(Debug, Clone)]
pub struct SecurityHeadersMiddleware {
    /// HSTS max-age; zero disables the header.
    pub hsts_seconds: u64,
    /// `X-Frame-Options` value.
    pub x_frame_options: String,
    /// `Referrer-Policy` value.
    pub referrer_policy: String,
}

impl Default for SecurityHeadersMiddleware {
    fn default() -> Self {
        Self {
            hsts_seconds: 0,
            x_frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
        }
    }
}

impl SecurityHeadersMiddleware {
    /// HSTS is only sent outside debug mode.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            hsts_seconds: if settings.debug { 0 } else { 31_536_000 },
            ..Self::default()
        }
    }
}

#[async_trait]
impl Middleware for SecurityHeadersMiddleware {
    async fn process_response(&self, _ctx: &RequestContext, response: ApiResponse) -> ApiResponse {
        let mut resp = response
            .with_header(HeaderName::from_static("x-content-type-options"), "nosniff")
            .with_header(HeaderName::from_static("x-frame-options"), &self.x_frame_options)
            .with_header(HeaderName::from_static("x-xss-protection"), "1; mode=block")
            .with_header(http::header::REFERRER_POLICY, &self.referrer_policy);
        if self.hsts_seconds > 0 {
            resp = resp.with_header(
                http::header::STRICT_TRANSPORT_SECURITY,
                &format!("max-age={}; includeSubDomains", self.hsts_seconds),
            );
        }
        resp
    }
}

/// The builtin pipeline selected by `settings.middleware`.
///
/// Order: timing, logging, security headers. Timing runs its response step
/// last, so the measured time includes the other middleware.
pub fn default_pipeline(settings: &Settings) -> MiddlewarePipeline {
    let MiddlewareSettings {
        timing,
        request_logging,
        security_headers,
        ..
    } = &settings.middleware;

    let mut pipeline = MiddlewarePipeline::new();
    if timing.enabled {
        pipeline.add(RequestTimingMiddleware::new(Duration::from_millis(timing.slow_threshold_ms)));
    }
    if *request_logging {
        pipeline.add(RequestLoggingMiddleware::default());
    }
    if *security_headers {
        pipeline.add(SecurityHeadersMiddleware::from_settings(settings));
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use faster_app_http::handler;
    use serde_json::json;

    async fn run(pipeline: &MiddlewarePipeline) -> ApiResponse {
        let ok = handler(|_ctx| async { Ok(ApiResponse::success(json!(null))) });
        pipeline.process(RequestContext::builder().build(), &ok, true).await
    }

    #[tokio::test]
    async fn test_timing_header() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(RequestTimingMiddleware::default());
        let resp = run(&pipeline).await;
        let value = resp.headers()[PROCESS_TIME_HEADER].to_str().unwrap();
        assert!(value.parse::<f64>().unwrap() >= 0.0);
        assert_eq!(value.split('.').nth(1).map(str::len), Some(4));
    }

    #[tokio::test]
    async fn test_security_headers() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(SecurityHeadersMiddleware::default());
        let resp = run(&pipeline).await;
        let headers = resp.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
        assert!(headers.get("strict-transport-security").is_none());

        let production = Settings {
            debug: false,
            ..Settings::default()
        };
        assert_eq!(SecurityHeadersMiddleware::from_settings(&production).hsts_seconds, 31_536_000);
    }

    #[test]
    fn test_default_pipeline_follows_settings() {
        let mut settings = Settings::default();
        assert_eq!(default_pipeline(&settings).len(), 2);
        settings.middleware.security_headers = true;
        settings.middleware.timing.enabled = false;
        let names = default_pipeline(&settings).names();
        assert_eq!(names, ["RequestLoggingMiddleware", "SecurityHeadersMiddleware"]);
    }
}
