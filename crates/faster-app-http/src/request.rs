//! Per-request context.
//!
//! A [`RequestContext`] is built once per inbound request, travels through the
//! ViewSet pipeline, and is dropped after the response is produced. The
//! authentication chain is the only writer of [`RequestContext::identity`].

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use faster_app_core::{AppError, AppResult, ValidationError};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::querydict::QueryDict;

/// The principal resolved by an authenticator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier; compared against owner references.
    pub id: String,
    /// Display name, if the credential carried one.
    #[serde(default)]
    pub username: Option<String>,
    /// Admin flag.
    #[serde(default)]
    pub is_admin: bool,
    /// Superuser flag.
    #[serde(default)]
    pub is_superuser: bool,
    /// Free-form role name.
    #[serde(default)]
    pub role: Option<String>,
    /// Raw claims of the credential.
    #[serde(default)]
    pub claims: serde_json::Value,
}

impl Identity {
    /// Creates an identity with just an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the admin flag.
    #[must_use]
    pub const fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Returns `true` for admins, superusers, and the `admin` role.
    pub fn has_admin_rights(&self) -> bool {
        self.is_admin || self.is_superuser || self.role.as_deref() == Some("admin")
    }

    /// Reads a raw claim.
    pub fn claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.claims.get(key)
    }
}

/// Everything a pipeline step may read about the current request.
///
/// # Examples
///
/// ```
/// use faster_app_http::RequestContext;
///
/// let ctx = RequestContext::builder()
///     .method(http::Method::GET)
///     .path("/notes/")
///     .query_string("search=rust")
///     .build();
/// assert_eq!(ctx.query().get("search"), Some("rust"));
/// assert!(!ctx.is_authenticated());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    query: QueryDict,
    headers: HeaderMap,
    client_addr: Option<IpAddr>,
    path_params: HashMap<String, String>,
    body: Bytes,
    request_id: String,
    started_at: Instant,
    /// The resolved principal; `None` until an authenticator succeeds.
    pub identity: Option<Identity>,
    /// The raw credential the identity was resolved from.
    pub auth_token: Option<String>,
}

impl RequestContext {
    /// Starts a builder.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Builds a context from request parts and the collected body.
    ///
    /// The client address comes from axum's `ConnectInfo` when present, then
    /// from `X-Forwarded-For` / `X-Real-IP`.
    pub fn from_parts(parts: &http::request::Parts, body: Bytes) -> Self {
        let connect = parts
            .extensions
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        let client_addr = connect.or_else(|| forwarded_addr(&parts.headers));
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: QueryDict::parse(parts.uri.query().unwrap_or("")),
            headers: parts.headers.clone(),
            client_addr,
            path_params: HashMap::new(),
            body,
            request_id,
            started_at: Instant::now(),
            identity: None,
            auth_token: None,
        }
    }

    /// HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parsed query parameters.
    pub const fn query(&self) -> &QueryDict {
        &self.query
    }

    /// Request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Reads a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Peer address, if known.
    pub const fn client_addr(&self) -> Option<IpAddr> {
        self.client_addr
    }

    /// Parameters captured from the route pattern.
    pub const fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Reads one captured path parameter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Replaces the captured path parameters.
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Request correlation id (`X-Request-ID` or a fresh UUID).
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// When the context was created.
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Deserializes the body as JSON.
    ///
    /// An empty body and malformed JSON are both validation failures.
    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        if self.body.is_empty() {
            return Err(ValidationError::new("Request body is required.", "required").into());
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            ValidationError::new(format!("Invalid JSON body: {e}"), "invalid_json").into()
        })
    }

    /// Returns `true` when an identity has been attached.
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Attaches the resolved identity and its credential.
    pub fn authenticate(&mut self, identity: Identity, token: Option<String>) {
        self.identity = Some(identity);
        self.auth_token = token;
    }

    /// Throttle key component: identity id, else peer address.
    pub fn ident(&self) -> String {
        self.identity.as_ref().map_or_else(
            || {
                self.client_addr
                    .map_or_else(|| "unknown".to_string(), |addr| addr.to_string())
            },
            |identity| identity.id.clone(),
        )
    }

    /// Returns `true` for GET, HEAD, and OPTIONS.
    pub fn is_read_method(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Reads a required path parameter.
    pub fn require_path_param(&self, name: &str) -> AppResult<&str> {
        self.path_param(name)
            .ok_or_else(|| AppError::bad_request(format!("Missing path parameter '{name}'")))
    }
}

fn forwarded_addr(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .and_then(|v| v.trim().parse().ok())
}

/// Builder for [`RequestContext`], mostly used in tests.
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Method,
    path: String,
    query_string: String,
    headers: HeaderMap,
    client_addr: Option<IpAddr>,
    path_params: HashMap<String, String>,
    body: Bytes,
    identity: Option<Identity>,
}

impl RequestContextBuilder {
    /// Sets the method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the raw query string.
    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    /// Adds a header; invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub const fn client_addr(mut self, addr: IpAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Adds a captured path parameter.
    #[must_use]
    pub fn path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name.to_string(), value.to_string());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.body(value.to_string())
    }

    /// Pre-attaches an identity.
    #[must_use]
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Builds the context.
    pub fn build(self) -> RequestContext {
        RequestContext {
            method: self.method,
            path: if self.path.is_empty() {
                "/".to_string()
            } else {
                self.path
            },
            query: QueryDict::parse(&self.query_string),
            headers: self.headers,
            client_addr: self.client_addr,
            path_params: self.path_params,
            body: self.body,
            request_id: uuid::Uuid::new_v4().to_string(),
            started_at: Instant::now(),
            identity: self.identity,
            auth_token: None,
        }
    }
}
