//! Request/response middleware.
//!
//! Middleware runs in registration order for requests and in reverse order
//! for responses. A `process_request` that returns a response short-circuits
//! the handler; only the middleware that already ran then see the response.
//!
//! Handler errors pass through `process_exception` (reverse order, first
//! `Some` wins) before falling back to the standard error envelope.

pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;
use faster_app_core::AppError;
use faster_app_http::{ApiResponse, RequestContext, RouteHandler};

/// A component that can inspect or rewrite requests and responses.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use faster_app_http::{ApiResponse, RequestContext};
/// use faster_app_views::middleware::{Middleware, MiddlewarePipeline};
///
/// struct Maintenance;
///
/// #[async_trait]
/// impl Middleware for Maintenance {
///     async fn process_request(&self, _ctx: &mut RequestContext) -> Option<ApiResponse> {
///         Some(ApiResponse::error("Down for maintenance", 503, http::StatusCode::SERVICE_UNAVAILABLE))
///     }
/// }
///
/// let mut pipeline = MiddlewarePipeline::new();
/// pipeline.add(Maintenance);
/// assert_eq!(pipeline.len(), 1);
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        crate::short_type_name::<Self>()
    }

    /// Runs before the handler. `Some` skips the handler.
    async fn process_request(&self, _ctx: &mut RequestContext) -> Option<ApiResponse> {
        None
    }

    /// Runs after the handler, in reverse order.
    async fn process_response(&self, _ctx: &RequestContext, response: ApiResponse) -> ApiResponse {
        response
    }

    /// Turns a handler error into a custom response.
    async fn process_exception(&self, _ctx: &RequestContext, _error: &AppError) -> Option<ApiResponse> {
        None
    }
}

/// An ordered middleware stack.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.middlewares.iter().map(|m| m.name()))
            .finish()
    }
}

impl MiddlewarePipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    pub fn add(&mut self, middleware: impl Middleware) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Appends a shared middleware.
    pub fn add_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Appends every middleware of `other`, keeping their order.
    pub fn extend(&mut self, other: Self) {
        self.middlewares.extend(other.middlewares);
    }

    /// Number of middleware.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Names of the middleware in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Runs `ctx` through the middleware and `handler`.
    ///
    /// Always produces a response: errors are translated with
    /// [`ApiResponse::from_error`] using `debug`.
    pub async fn process(&self, mut ctx: RequestContext, handler: &RouteHandler, debug: bool) -> ApiResponse {
        for (i, mw) in self.middlewares.iter().enumerate() {
            if let Some(response) = mw.process_request(&mut ctx).await {
                let mut resp = response;
                for earlier in self.middlewares[..=i].iter().rev() {
                    resp = earlier.process_response(&ctx, resp).await;
                }
                return resp;
            }
        }

        let mut resp = match handler(ctx.clone()).await {
            Ok(resp) => resp,
            Err(err) => self.handle_error(&ctx, &err, debug).await,
        };

        for mw in self.middlewares.iter().rev() {
            resp = mw.process_response(&ctx, resp).await;
        }
        resp
    }

    async fn handle_error(&self, ctx: &RequestContext, err: &AppError, debug: bool) -> ApiResponse {
        for mw in self.middlewares.iter().rev() {
            if let Some(resp) = mw.process_exception(ctx, err).await {
                return resp;
            }
        }
        if err.is_server_error() {
            tracing::error!(
                method = %ctx.method(),
                path = ctx.path(),
                request_id = ctx.request_id(),
                error = %err,
                detail = ?err.detail(),
                "request failed"
            );
        } else {
            tracing::debug!(
                method = %ctx.method(),
                path = ctx.path(),
                status = err.status_code(),
                error = %err,
                "request rejected"
            );
        }
        ApiResponse::from_error(err, debug)
    }
}
