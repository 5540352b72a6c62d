//! The application server.
//!
//! [`FasterApp`] collects route tables (usually from ViewSet routers), an
//! optional [`AppRegistry`], and middleware. [`FasterApp::build`] validates
//! the routes and produces an axum [`Router`]; [`FasterApp::run`] also drives
//! the registry lifecycle around serving.
//!
//! # Examples
//!
//! ```no_run
//! use faster_app_core::Settings;
//! use faster_app_views::server::FasterApp;
//!
//! # async fn example() -> faster_app_core::AppResult<()> {
//! FasterApp::new(Settings::default())
//!     // .router(NoteViewSet::router("/notes"))
//!     .run()
//!     .await
//! # }
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use faster_app_core::logging::{request_span, setup_logging};
use faster_app_core::{AppError, AppRegistry, AppResult, Settings, SETTINGS};
use faster_app_http::{
    handler, ApiResponse, RequestContext, RouteHandler, RouteSummary, RouteTable, RouteValidator,
    ValidationMode,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::Instrument;

use crate::health::builtin_routes;
use crate::middleware::builtin::default_pipeline;
use crate::middleware::{Middleware, MiddlewarePipeline};
use crate::router::IntoRouteTable;
use crate::viewsets::throttling::ThrottleStore;

/// Largest request body read into a [`RequestContext`].
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application builder.
pub struct FasterApp {
    settings: Settings,
    tables: Vec<AppResult<RouteTable>>,
    registry: Option<Arc<AppRegistry>>,
    middleware: MiddlewarePipeline,
    default_middleware: bool,
}

impl std::fmt::Debug for FasterApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FasterApp")
            .field("project", &self.settings.project_name)
            .field("tables", &self.tables.len())
            .field("has_registry", &self.registry.is_some())
            .field("middleware", &self.middleware)
            .field("default_middleware", &self.default_middleware)
            .finish()
    }
}

impl FasterApp {
    /// Creates an application with the builtin middleware enabled.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            tables: Vec::new(),
            registry: None,
            middleware: MiddlewarePipeline::new(),
            default_middleware: true,
        }
    }

    /// The application settings.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mounts a router or a prebuilt route table.
    ///
    /// Build errors are kept and reported by [`build`](Self::build).
    #[must_use]
    pub fn router(mut self, router: impl IntoRouteTable) -> Self {
        self.tables.push(router.into_route_table());
        self
    }

    /// Attaches the application registry served by `/ready`.
    #[must_use]
    pub fn registry(mut self, registry: AppRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Attaches a registry shared with other owners.
    #[must_use]
    pub fn shared_registry(mut self, registry: Arc<AppRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Appends a middleware after the builtin ones.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Skips the builtin timing, logging and security-header middleware.
    #[must_use]
    pub const fn without_default_middleware(mut self) -> Self {
        self.default_middleware = false;
        self
    }

    /// Merges every route table, builtins first, and validates the result.
    pub fn route_table(&mut self) -> AppResult<RouteTable> {
        let mut table = builtin_routes(&self.settings, self.registry.clone())?;
        for part in std::mem::take(&mut self.tables) {
            table.merge(part?);
        }

        let mut validator = RouteValidator::new(ValidationMode::from_settings(
            self.settings.validate_routes,
            self.settings.route_validation,
        ));
        validator.collect(table.records());
        validator.validate()?;
        log_summary(&validator.summary());
        Ok(table)
    }

    /// Builds the axum router.
    pub fn build(mut self) -> AppResult<Router> {
        let table = Arc::new(self.route_table()?);
        let debug = self.settings.debug;

        let mut pipeline = if self.default_middleware {
            default_pipeline(&self.settings)
        } else {
            MiddlewarePipeline::new()
        };
        pipeline.extend(std::mem::take(&mut self.middleware));
        let pipeline = Arc::new(pipeline);
        let dispatch = dispatcher(table);

        let entry = move |req: Request<Body>| {
            let pipeline = Arc::clone(&pipeline);
            let dispatch = Arc::clone(&dispatch);
            async move { serve_request(req, &pipeline, &dispatch, debug).await }
        };

        let mut router = Router::new()
            .route("/{*path}", any(entry.clone()))
            .route("/", any(entry))
            .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
                panic_response(&panic, debug)
            }));
        if self.settings.middleware.cors {
            router = router.layer(CorsLayer::permissive());
        }
        if self.settings.middleware.compression {
            router = router.layer(CompressionLayer::new());
        }
        Ok(router)
    }

    /// Configures logging and global settings, starts the registry, serves
    /// until ctrl-c, then shuts the registry down.
    pub async fn run(self) -> AppResult<()> {
        setup_logging(&self.settings);
        self.settings.check_production()?;
        if !SETTINGS.configure(self.settings.clone()) {
            tracing::debug!("global settings were already configured");
        }

        let addr = self.settings.server.addr();
        let lifespan = self.settings.lifespan.clone();
        let sweep_secs = self.settings.throttle.sweep_interval_secs;
        let registry = self.registry.clone();
        let router = self.build()?;

        let sweeper = (sweep_secs > 0)
            .then(|| ThrottleStore::global().spawn_sweeper(Duration::from_secs(sweep_secs)));

        if let Some(registry) = &registry {
            registry
                .startup_all(Duration::from_secs(lifespan.startup_timeout_secs))
                .await?;
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            AppError::improperly_configured(format!("Failed to bind to {addr}")).with_detail(e.to_string())
        })?;
        tracing::info!(%addr, "listening");

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Some(registry) = &registry {
            registry
                .shutdown_all(Duration::from_secs(lifespan.shutdown_timeout_secs))
                .await;
        }
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        served.map_err(|e| AppError::internal("Server error").with_detail(e.to_string()))
    }
}

fn dispatcher(table: Arc<RouteTable>) -> RouteHandler {
    handler(move |mut ctx: RequestContext| {
        let table = Arc::clone(&table);
        async move {
            let method = ctx.method().clone();
            let path = ctx.path().to_string();
            let (route, params) = table.resolve(&method, &path).into_match(&method, &path)?;
            ctx.set_path_params(params);
            route(ctx).await
        }
    })
}

async fn serve_request(
    req: Request<Body>,
    pipeline: &MiddlewarePipeline,
    dispatch: &RouteHandler,
    debug: bool,
) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = AppError::bad_request("Failed to read request body").with_detail(e.to_string());
            return ApiResponse::from_error(&err, debug).into_response();
        }
    };
    let ctx = RequestContext::from_parts(&parts, bytes);
    let span = request_span(ctx.method().as_str(), ctx.path(), ctx.request_id());
    pipeline
        .process(ctx, dispatch, debug)
        .instrument(span)
        .await
        .into_response()
}

fn panic_response(panic: &(dyn Any + Send), debug: bool) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(%detail, "handler panicked");
    let err = AppError::internal("Handler panicked").with_detail(detail);
    ApiResponse::from_error(&err, debug).into_response()
}

fn log_summary(summary: &RouteSummary) {
    tracing::info!(
        total = summary.total_routes,
        unique_paths = summary.unique_paths,
        methods = ?summary.methods,
        "routes registered"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
