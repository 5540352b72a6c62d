//! # faster-app-http
//!
//! HTTP layer for faster-app. Provides the per-request [`RequestContext`], the
//! standard [`ApiResponse`] envelope with its single error translator, ordered
//! route tables with `{param}` patterns, and the startup route validator.

use std::future::Future;
use std::pin::Pin;

pub mod querydict;
pub mod request;
pub mod response;
pub mod urls;

pub use querydict::QueryDict;
pub use request::{Identity, RequestContext};
pub use response::{ApiResponse, Envelope, FieldErrorEntry};
pub use urls::pattern::RoutePattern;
pub use urls::resolver::{handler, Resolution, RouteEntry, RouteHandler, RouteTable};
pub use urls::validator::{
    ConflictKind, RouteConflict, RouteRecord, RouteSummary, RouteValidator, ValidationMode,
};

/// A boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
