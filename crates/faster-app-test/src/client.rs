//! In-process HTTP test client.
//!
//! [`TestClient`] sends requests straight into an axum [`Router`] with
//! `tower::ServiceExt::oneshot`; no socket is opened. Headers set with
//! [`with_header`](TestClient::with_header) or
//! [`with_bearer`](TestClient::with_bearer) are sent on every later request.
//!
//! ```rust,no_run
//! use faster_app_core::Settings;
//! use faster_app_test::TestClient;
//! use faster_app_views::FasterApp;
//!
//! # async fn example() {
//! let router = FasterApp::new(Settings::default()).build().unwrap();
//! let client = TestClient::new(router);
//! let resp = client.get("/health").await;
//! assert_eq!(resp.status_code(), 200);
//! assert_eq!(resp.data()["status"], "healthy");
//! # }
//! ```

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::Router;
use bytes::Bytes;
use faster_app_core::{AppError, AppResult};
use faster_app_http::Envelope;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;

/// Sends requests to a router in-process.
#[derive(Clone)]
pub struct TestClient {
    app: Router,
    headers: HeaderMap,
    client_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("headers", &self.headers)
            .field("client_addr", &self.client_addr)
            .finish_non_exhaustive()
    }
}

impl TestClient {
    /// Wraps `app`.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            headers: HeaderMap::new(),
            client_addr: None,
        }
    }

    /// Sends `name: value` on every request.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a valid header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes()).expect("invalid header name");
        let value = HeaderValue::from_str(value).expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// Sends `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// Sends `Authorization: Token <token>` on every request.
    #[must_use]
    pub fn with_token(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION.as_str(), &format!("Token {token}"))
    }

    /// Presents requests as coming from `addr`, as `into_make_service_with_connect_info` would.
    #[must_use]
    pub const fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// `GET path`.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    /// `POST path` with a JSON body.
    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, path, Some(body)).await
    }

    /// `PUT path` with a JSON body.
    pub async fn put_json(&self, path: &str, body: &Value) -> TestResponse {
        self.send(Method::PUT, path, Some(body)).await
    }

    /// `PATCH path` with a JSON body.
    pub async fn patch_json(&self, path: &str, body: &Value) -> TestResponse {
        self.send(Method::PATCH, path, Some(body)).await
    }

    /// `DELETE path`.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(Method::DELETE, path, None).await
    }

    /// Sends an arbitrary request, optionally with a JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the router fails, which only
    /// happens for malformed paths.
    pub async fn send(&self, method: Method, path: &str, json: Option<&Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let body = match json {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let mut req = builder.body(body).expect("request builder should not fail");
        if let Some(addr) = self.client_addr {
            req.extensions_mut().insert(ConnectInfo(addr));
        }

        let response = self
            .app
            .clone()
            .oneshot(req)
            .await
            .expect("router should not error");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map_or_else(|_| Bytes::new(), http_body_util::Collected::to_bytes);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// A captured response.
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Bytes,
}

impl TestResponse {
    /// Numeric status code.
    pub const fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Body as lossy UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            AppError::bad_request("Response body is not the expected JSON").with_detail(e.to_string())
        })
    }

    /// Body decoded as the standard envelope.
    ///
    /// # Panics
    ///
    /// Panics if the body is not an envelope.
    pub fn envelope(&self) -> Envelope {
        self.json().unwrap_or_else(|e| panic!("not an envelope: {e}; body: {}", self.text()))
    }

    /// The envelope's `data` member.
    pub fn data(&self) -> Value {
        self.envelope().data
    }

    /// A header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
