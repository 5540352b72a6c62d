//! The standard response envelope.
//!
//! Every response, success or failure, serializes as
//! `{success, code, message, data, timestamp}`. [`ApiResponse::from_error`] is
//! the only place that turns an [`AppError`] into an envelope and decides how
//! much diagnostic detail leaves the process.

use axum::response::{IntoResponse, Response};
use faster_app_core::AppError;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used for successful responses when none is given.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "OK";
/// Message used for successful deletes.
pub const DEFAULT_DELETE_MESSAGE: &str = "Deleted";
/// Message that replaces internal error messages outside debug mode.
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrorEntry {
    pub field: String,
    pub message: String,
    pub code: String,
}

/// The serialized envelope body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldErrorEntry>>,
}

/// An envelope plus its HTTP status and extra headers.
///
/// # Examples
///
/// ```
/// use faster_app_http::ApiResponse;
/// use serde_json::json;
///
/// let resp = ApiResponse::created(json!({"id": 1}));
/// assert_eq!(resp.status(), http::StatusCode::CREATED);
/// assert!(resp.envelope().success);
/// assert_eq!(resp.envelope().code, 201);
/// ```
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    envelope: Envelope,
}

impl ApiResponse {
    /// 200 with the default message.
    pub fn success(data: Value) -> Self {
        Self::success_with(data, DEFAULT_SUCCESS_MESSAGE, StatusCode::OK)
    }

    /// A success envelope with an explicit message and status.
    pub fn success_with(data: Value, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            envelope: Envelope {
                success: true,
                code: status.as_u16(),
                message: message.into(),
                data,
                timestamp: now(),
                error_detail: None,
                errors: None,
            },
        }
    }

    /// 201 for a newly created resource.
    pub fn created(data: Value) -> Self {
        Self::success_with(data, "Created", StatusCode::CREATED)
    }

    /// 200 acknowledging a delete.
    pub fn deleted() -> Self {
        Self::success_with(Value::Null, DEFAULT_DELETE_MESSAGE, StatusCode::OK)
    }

    /// A failure envelope built by hand, for business errors that do not abort.
    pub fn error(message: impl Into<String>, code: u16, status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            envelope: Envelope {
                success: false,
                code,
                message: message.into(),
                data: Value::Null,
                timestamp: now(),
                error_detail: None,
                errors: None,
            },
        }
    }

    /// Translates an error into its envelope.
    ///
    /// `error_detail` and the validation `errors` list are only exposed when
    /// `debug` is set; outside debug mode server errors carry a generic message.
    pub fn from_error(err: &AppError, debug: bool) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if err.is_server_error() && !debug {
            GENERIC_INTERNAL_MESSAGE.to_string()
        } else {
            err.message()
        };

        let mut resp = Self::error(message, err.business_code(), status);
        resp.envelope.data = err.data().cloned().unwrap_or(Value::Null);

        if debug {
            resp.envelope.error_detail = err.detail();
            if let AppError::ValidationFailed(validation) = err {
                resp.envelope.errors = Some(
                    validation
                        .flatten()
                        .into_iter()
                        .map(|(field, message, code)| FieldErrorEntry {
                            field,
                            message,
                            code,
                        })
                        .collect(),
                );
            }
        }

        if let AppError::RateLimited(_) = err {
            if let Some(wait) = err.data().and_then(|d| d.get("wait")).and_then(Value::as_u64) {
                resp = resp.with_header(http::header::RETRY_AFTER, &wait.to_string());
            }
        }
        resp
    }

    /// Overrides the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.envelope.message = message.into();
        self
    }

    /// Replaces the `data` member.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.envelope.data = data;
        self
    }

    /// Adds a response header; invalid values are dropped.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// HTTP status.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Extra headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The envelope body.
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The `data` member.
    pub const fn data(&self) -> &Value {
        &self.envelope.data
    }

    /// Consumes the response, returning the `data` member.
    pub fn into_data(self) -> Value {
        self.envelope.data
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, axum::Json(self.envelope)).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
