//! Custom (non-CRUD) actions.
//!
//! An [`Action`] is a metadata entry plus a handler. A ViewSet lists its
//! actions in [`ViewSet::actions`](super::base::ViewSet::actions) and the
//! router turns each one into a route, ahead of the generic `/{id}` routes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use faster_app_core::{AppError, AppResult};
use faster_app_db::Record;
use faster_app_http::{ApiResponse, BoxFuture, RequestContext};
use http::Method;

use super::base::Resource;

/// What an action handler receives.
///
/// The throttle, authentication and permission checks have already passed.
/// For detail actions the target record has been loaded and has passed the
/// object-level permission check.
#[derive(Debug)]
pub struct ActionRequest {
    /// The request, with its identity resolved.
    pub ctx: RequestContext,
    /// The resource the action belongs to.
    pub resource: Arc<Resource>,
    /// The target record of a detail action.
    pub object: Option<Record>,
}

impl ActionRequest {
    /// The target record; an error for collection actions.
    pub fn object(&self) -> AppResult<&Record> {
        self.object
            .as_ref()
            .ok_or_else(|| AppError::improperly_configured("Collection actions have no target object"))
    }

    /// Takes the target record out of the request.
    pub fn take_object(&mut self) -> AppResult<Record> {
        self.object
            .take()
            .ok_or_else(|| AppError::improperly_configured("Collection actions have no target object"))
    }
}

/// The boxed handler of an action; the ViewSet instance is fresh per request.
pub type ActionHandler<V> =
    Arc<dyn Fn(V, ActionRequest) -> BoxFuture<'static, AppResult<ApiResponse>> + Send + Sync>;

/// A custom action on a ViewSet.
///
/// # Examples
///
/// ```
/// use faster_app_views::viewsets::actions::Action;
/// use faster_app_views::viewsets::actions::ActionRequest;
/// use faster_app_http::ApiResponse;
/// use http::Method;
///
/// #[derive(Default)]
/// struct Notes;
///
/// let publish = Action::<Notes>::new("mark_read")
///     .methods([Method::POST])
///     .detail(true)
///     .handler(|_view: Notes, req: ActionRequest| async move {
///         Ok(ApiResponse::success(req.object()?.to_json()))
///     });
/// assert_eq!(publish.path_segment(), "mark-read");
/// assert!(publish.is_detail());
/// ```
pub struct Action<V> {
    name: String,
    methods: Vec<Method>,
    detail: bool,
    url_path: Option<String>,
    url_name: Option<String>,
    summary: Option<String>,
    handler: Option<ActionHandler<V>>,
}

impl<V> fmt::Debug for Action<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("detail", &self.detail)
            .field("path", &self.path_segment())
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl<V: Send + 'static> Action<V> {
    /// Declares an action answering `GET` on the collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: vec![Method::GET],
            detail: false,
            url_path: None,
            url_name: None,
            summary: None,
            handler: None,
        }
    }

    /// Sets the HTTP methods.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Binds the action to one record (`/{id}/<path>`).
    #[must_use]
    pub const fn detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    /// Overrides the path segment.
    #[must_use]
    pub fn url_path(mut self, path: impl Into<String>) -> Self {
        self.url_path = Some(path.into());
        self
    }

    /// Overrides the reverse-lookup name suffix.
    #[must_use]
    pub fn url_name(mut self, name: impl Into<String>) -> Self {
        self.url_name = Some(name.into());
        self
    }

    /// One-line description.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the handler.
    #[must_use]
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(V, ActionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<ApiResponse>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |view, req| Box::pin(f(view, req))));
        self
    }
}

impl<V> Action<V> {
    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP methods.
    pub fn http_methods(&self) -> &[Method] {
        &self.methods
    }

    /// Returns `true` for detail actions.
    pub const fn is_detail(&self) -> bool {
        self.detail
    }

    /// Path segment: the explicit one, else the name with `_` replaced by `-`.
    pub fn path_segment(&self) -> String {
        self.url_path
            .clone()
            .unwrap_or_else(|| self.name.replace('_', "-"))
    }

    /// Reverse-lookup name suffix: the explicit one, else the name.
    pub fn route_name(&self) -> &str {
        self.url_name.as_deref().unwrap_or(&self.name)
    }

    /// Description, if any.
    pub fn summary_text(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// The handler; an error if none was set.
    pub fn handler_fn(&self) -> AppResult<ActionHandler<V>> {
        self.handler.clone().ok_or_else(|| {
            AppError::improperly_configured(format!("Action '{}' has no handler", self.name))
        })
    }
}
