//! Core error types for the faster-app toolkit.
//!
//! [`AppError`] is the single error taxonomy used by every pipeline step. Each
//! variant maps to an HTTP status via [`AppError::status_code`] and carries the
//! payload that the response boundary turns into the standard envelope: a
//! message, a business code, an optional detail string, and optional structured
//! data.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Represents a validation error with optional field-level errors.
///
/// # Examples
///
/// ```
/// use faster_app_core::error::ValidationError;
///
/// let err = ValidationError::new("This field is required.", "required");
/// assert_eq!(err.to_string(), "This field is required.");
///
/// let err = ValidationError::default()
///     .with_field_error("name", ValidationError::new("Too long.", "max_length"));
/// assert_eq!(err.to_string(), "name: Too long.");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: BTreeMap<String, String>,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: BTreeMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: BTreeMap::new(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: BTreeMap<String, Vec<Self>>) -> Self {
        Self {
            field_errors,
            ..Self::default()
        }
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Appends an error for a single field.
    #[must_use]
    pub fn with_field_error(mut self, field: impl Into<String>, error: Self) -> Self {
        self.field_errors.entry(field.into()).or_default().push(error);
        self
    }

    /// Flattens the field errors into `(field, message, code)` triples.
    ///
    /// A top-level message without field errors is reported under the
    /// `non_field_errors` key.
    pub fn flatten(&self) -> Vec<(String, String, String)> {
        let mut out = Vec::new();
        if !self.message.is_empty() && self.field_errors.is_empty() {
            out.push((
                "non_field_errors".to_string(),
                self.message.clone(),
                self.code.clone(),
            ));
        }
        for (field, errors) in &self.field_errors {
            for error in errors {
                out.push((field.clone(), error.message.clone(), error.code.clone()));
            }
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut first = true;
            for (field, errors) in &self.field_errors {
                for error in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The payload shared by every non-validation error variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    /// Human-readable message shown to clients.
    pub message: String,
    /// Business code; defaults to the HTTP status when unset.
    pub code: Option<u16>,
    /// Extra diagnostic text, only exposed in debug mode.
    pub detail: Option<String>,
    /// Structured data attached to the error envelope.
    pub data: Option<serde_json::Value>,
}

impl ErrorContext {
    /// Creates a context holding only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The primary error type for faster-app.
///
/// Handlers and pipeline steps return `AppError`; only the response boundary
/// decides how much of it a client gets to see.
#[derive(Error, Debug)]
pub enum AppError {
    // ── Client errors ────────────────────────────────────────────────

    /// HTTP 400, malformed input to create/update or bad query parameters.
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationError),

    /// HTTP 400 Bad Request.
    #[error("Bad request: {0}")]
    BadRequest(ErrorContext),

    /// HTTP 401 Unauthorized.
    #[error("Unauthorized: {0}")]
    Unauthorized(ErrorContext),

    /// HTTP 403 Forbidden.
    #[error("Forbidden: {0}")]
    Forbidden(ErrorContext),

    /// HTTP 404 Not Found.
    #[error("Not found: {0}")]
    NotFound(ErrorContext),

    /// HTTP 405 Method Not Allowed.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(ErrorContext),

    /// HTTP 409 Conflict, typically raised by a hook enforcing a business rule.
    #[error("Conflict: {0}")]
    Conflict(ErrorContext),

    /// HTTP 429 Too Many Requests.
    #[error("Rate limited: {0}")]
    RateLimited(ErrorContext),

    // ── Server errors ────────────────────────────────────────────────

    /// HTTP 500 Internal Server Error.
    #[error("Internal error: {0}")]
    Internal(ErrorContext),

    /// The application is wired incorrectly (dependency cycles, bad settings, route conflicts).
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(ErrorContext),
}

impl AppError {
    /// Creates a [`AppError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(ErrorContext::new(message))
    }

    /// Creates a [`AppError::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(ErrorContext::new(message))
    }

    /// Creates a [`AppError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(ErrorContext::new(message))
    }

    /// Creates a [`AppError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(ErrorContext::new(message))
    }

    /// Creates a [`AppError::MethodNotAllowed`].
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::MethodNotAllowed(ErrorContext::new(message))
    }

    /// Creates a [`AppError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(ErrorContext::new(message))
    }

    /// Creates a [`AppError::RateLimited`].
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited(ErrorContext::new(message))
    }

    /// Creates a [`AppError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(ErrorContext::new(message))
    }

    /// Creates a [`AppError::ImproperlyConfigured`].
    pub fn improperly_configured(message: impl Into<String>) -> Self {
        Self::ImproperlyConfigured(ErrorContext::new(message))
    }

    /// Creates a [`AppError::ValidationFailed`] with a single message.
    pub fn validation(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::ValidationFailed(ValidationError::new(message, code))
    }

    /// Attaches structured data to the error envelope.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        if let Some(ctx) = self.context_mut() {
            ctx.data = Some(data);
        }
        self
    }

    /// Attaches a diagnostic detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        if let Some(ctx) = self.context_mut() {
            ctx.detail = Some(detail.into());
        }
        self
    }

    /// Overrides the business code reported in the envelope.
    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        if let Some(ctx) = self.context_mut() {
            ctx.code = Some(code);
        }
        self
    }

    /// Returns the HTTP status code associated with this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ValidationFailed(_) | Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::Conflict(_) => 409,
            Self::RateLimited(_) => 429,
            Self::Internal(_) | Self::ImproperlyConfigured(_) => 500,
        }
    }

    /// Returns the business code, falling back to the HTTP status.
    pub fn business_code(&self) -> u16 {
        self.context()
            .and_then(|ctx| ctx.code)
            .unwrap_or_else(|| self.status_code())
    }

    /// Returns the client-facing message.
    pub fn message(&self) -> String {
        match self {
            Self::ValidationFailed(err) => {
                if err.message.is_empty() {
                    "Validation failed".to_string()
                } else {
                    err.message.clone()
                }
            }
            other => other
                .context()
                .map(|ctx| ctx.message.clone())
                .unwrap_or_default(),
        }
    }

    /// Returns the diagnostic detail, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::ValidationFailed(err) => Some(err.to_string()),
            other => other.context().and_then(|ctx| ctx.detail.clone()),
        }
    }

    /// Returns the structured data attached to the error, if any.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.context().and_then(|ctx| ctx.data.as_ref())
    }

    /// Returns `true` for 5xx errors.
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    const fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::ValidationFailed(_) => None,
            Self::BadRequest(ctx)
            | Self::Unauthorized(ctx)
            | Self::Forbidden(ctx)
            | Self::NotFound(ctx)
            | Self::MethodNotAllowed(ctx)
            | Self::Conflict(ctx)
            | Self::RateLimited(ctx)
            | Self::Internal(ctx)
            | Self::ImproperlyConfigured(ctx) => Some(ctx),
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::ValidationFailed(_) => None,
            Self::BadRequest(ctx)
            | Self::Unauthorized(ctx)
            | Self::Forbidden(ctx)
            | Self::NotFound(ctx)
            | Self::MethodNotAllowed(ctx)
            | Self::Conflict(ctx)
            | Self::RateLimited(ctx)
            | Self::Internal(ctx)
            | Self::ImproperlyConfigured(ctx) => Some(ctx),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationFailed(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal("I/O failure").with_detail(err.to_string())
    }
}

/// A convenience type alias for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
