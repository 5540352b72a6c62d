//! Ordered route resolution.
//!
//! A [`RouteTable`] is a flat list of [`RouteEntry`] values. Resolution walks
//! the list in registration order and the first entry whose pattern and method
//! both match wins, so a literal `/notes/stats` registered before `/notes/{id}`
//! is never shadowed. A path that matches only under other methods resolves to
//! [`Resolution::MethodNotAllowed`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use faster_app_core::{AppError, AppResult};
use http::Method;

use super::pattern::RoutePattern;
use super::validator::RouteRecord;
use crate::request::RequestContext;
use crate::response::ApiResponse;
use crate::BoxFuture;

/// An async handler bound to a route.
pub type RouteHandler =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, AppResult<ApiResponse>> + Send + Sync>;

/// Boxes an async function into a [`RouteHandler`].
pub fn handler<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<ApiResponse>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// One routable endpoint.
#[derive(Clone)]
pub struct RouteEntry {
    /// Methods served by this entry.
    pub methods: Vec<Method>,
    /// Path pattern.
    pub pattern: RoutePattern,
    /// Reverse-lookup name such as `notes-list`.
    pub name: Option<String>,
    /// Label naming where the route came from, for conflict reports.
    pub source: String,
    /// The handler.
    pub handler: RouteHandler,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern.route())
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl RouteEntry {
    /// Creates an entry.
    pub fn new(
        methods: Vec<Method>,
        pattern: RoutePattern,
        source: impl Into<String>,
        handler: RouteHandler,
    ) -> Self {
        Self {
            methods,
            pattern,
            name: None,
            source: source.into(),
            handler,
        }
    }

    /// Sets the reverse-lookup name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns `true` if this entry serves `method`; HEAD falls back to GET.
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method) || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }

    /// One validator record per method.
    pub fn records(&self) -> Vec<RouteRecord> {
        self.methods
            .iter()
            .map(|m| RouteRecord::new(m.clone(), &self.pattern, &self.source))
            .collect()
    }
}

/// Outcome of resolving a request.
pub enum Resolution<'a> {
    /// A matching entry and its captured parameters.
    Matched {
        entry: &'a RouteEntry,
        params: HashMap<String, String>,
    },
    /// The path exists but not for this method.
    MethodNotAllowed { allowed: Vec<Method> },
    /// Nothing matches the path.
    NotFound,
}

impl Resolution<'_> {
    /// Converts the miss variants into errors.
    pub fn into_match(self, method: &Method, path: &str) -> AppResult<(RouteHandler, HashMap<String, String>)> {
        match self {
            Self::Matched { entry, params } => Ok((Arc::clone(&entry.handler), params)),
            Self::MethodNotAllowed { allowed } => {
                let allowed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                Err(AppError::method_not_allowed(format!(
                    "Method {method} not allowed on {path}"
                ))
                .with_data(serde_json::json!({ "allowed": allowed })))
            }
            Self::NotFound => Err(AppError::not_found(format!("No route matches {path}"))),
        }
    }
}

/// Routes in precedence order.
///
/// # Examples
///
/// ```
/// use faster_app_http::urls::resolver::handler;
/// use faster_app_http::{ApiResponse, RoutePattern, RouteTable, RouteEntry, Resolution};
/// use http::Method;
///
/// let handler = handler(|_ctx| async { Ok(ApiResponse::success(serde_json::Value::Null)) });
/// let mut table = RouteTable::new();
/// table.push(RouteEntry::new(vec![Method::GET], RoutePattern::parse("/stats").unwrap(), "demo", handler.clone()));
/// table.push(RouteEntry::new(vec![Method::GET], RoutePattern::parse("/{id}").unwrap(), "demo", handler));
///
/// match table.resolve(&Method::GET, "/stats") {
///     Resolution::Matched { params, .. } => assert!(params.is_empty()),
///     _ => panic!("expected a match"),
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry at the lowest precedence.
    pub fn push(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    /// Appends every entry of `other`, keeping its order.
    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Entries in precedence order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validator records for every (method, pattern) pair.
    pub fn records(&self) -> Vec<RouteRecord> {
        self.entries.iter().flat_map(RouteEntry::records).collect()
    }

    /// Finds the entry serving `method` on `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let mut allowed: Vec<Method> = Vec::new();
        for entry in &self.entries {
            let Some(params) = entry.pattern.match_path(path) else {
                continue;
            };
            if entry.allows(method) {
                return Resolution::Matched { entry, params };
            }
            for m in &entry.methods {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }
        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed { allowed }
        }
    }

    /// Looks up a named route and fills in its parameters.
    pub fn reverse(&self, name: &str, params: &HashMap<String, String>) -> Option<String> {
        let entry = self.entries.iter().find(|e| e.name.as_deref() == Some(name))?;
        let mut route = entry.pattern.route().to_string();
        for param in entry.pattern.param_names() {
            let value = params.get(param)?;
            let start = route.find(&format!("{{{param}"))?;
            let end = start + route[start..].find('}')? + 1;
            route.replace_range(start..end, value);
        }
        Some(route)
    }
}
