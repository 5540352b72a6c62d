//! Turns ViewSets into route tables.
//!
//! [`ViewSetRouter`] registers, in this order: custom actions, then list and
//! create on the collection path, then retrieve, update, partial update and
//! destroy on `/{id}`. Actions come first so a literal path such as
//! `/notes/recent` is never captured by `/notes/{id}`.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use faster_app_core::{AppError, AppResult};
use faster_app_http::urls::join;
use faster_app_http::{
    handler, ApiResponse, RequestContext, RouteEntry, RouteHandler, RoutePattern, RouteTable,
};
use http::Method;

use crate::viewsets::actions::{Action, ActionHandler, ActionRequest};
use crate::viewsets::base::{Resource, ViewSet};
use crate::viewsets::mixins::{
    load_object, CreateModelMixin, DestroyModelMixin, ListModelMixin, RetrieveModelMixin,
    UpdateModelMixin, PK_PARAM,
};

// ── Operations ──────────────────────────────────────────────────────

/// A standard operation, one letter of a `"CRUDL"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Create,
    Retrieve,
    /// Covers both `PUT` and `PATCH`.
    Update,
    Destroy,
    List,
}

impl Operation {
    /// The operation's letter.
    pub const fn letter(self) -> char {
        match self {
            Self::Create => 'C',
            Self::Retrieve => 'R',
            Self::Update => 'U',
            Self::Destroy => 'D',
            Self::List => 'L',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Self::Create),
            'R' => Some(Self::Retrieve),
            'U' => Some(Self::Update),
            'D' => Some(Self::Destroy),
            'L' => Some(Self::List),
            _ => None,
        }
    }
}

/// A set of enabled operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operations(BTreeSet<Operation>);

impl Operations {
    /// Returns `true` if `op` is enabled.
    pub fn contains(&self, op: Operation) -> bool {
        self.0.contains(&op)
    }

    /// Operations enabled in both sets.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Returns `true` if nothing is enabled.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Operations {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| {
                Operation::from_letter(c).ok_or_else(|| {
                    AppError::improperly_configured(format!(
                        "Unknown operation '{c}' in '{s}'; expected letters from CRUDL"
                    ))
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|op| write!(f, "{}", op.letter()))
    }
}

// ── Router ──────────────────────────────────────────────────────────

/// Anything that can contribute routes to an application.
pub trait IntoRouteTable {
    /// Builds the routes.
    fn into_route_table(self) -> AppResult<RouteTable>;
}

impl IntoRouteTable for RouteTable {
    fn into_route_table(self) -> AppResult<RouteTable> {
        Ok(self)
    }
}

/// Route builder for one ViewSet.
///
/// ```ignore
/// let routes = NoteViewSet::router("/notes")
///     .tags(["notes"])
///     .operations("RL")
///     .build()?;
/// ```
pub struct ViewSetRouter<V> {
    prefix: String,
    tags: Vec<String>,
    operations: Option<String>,
    basename: Option<String>,
    _view: PhantomData<fn() -> V>,
}

impl<V> fmt::Debug for ViewSetRouter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSetRouter")
            .field("viewset", &crate::short_type_name::<V>())
            .field("prefix", &self.prefix)
            .field("tags", &self.tags)
            .field("operations", &self.operations)
            .field("basename", &self.basename)
            .finish()
    }
}

impl<V: ViewSet> ViewSetRouter<V> {
    /// Routes under `prefix`, with every operation the ViewSet supports.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            tags: Vec::new(),
            operations: None,
            basename: None,
            _view: PhantomData,
        }
    }

    /// Grouping tags for documentation and logs.
    #[must_use]
    pub fn tags<'a>(mut self, tags: impl IntoIterator<Item = &'a str>) -> Self {
        self.tags = tags.into_iter().map(str::to_string).collect();
        self
    }

    /// Restricts the generated operations, e.g. `"RL"` for read-only.
    #[must_use]
    pub fn operations(mut self, operations: impl Into<String>) -> Self {
        self.operations = Some(operations.into());
        self
    }

    /// Overrides the route-name prefix (defaults to the collection name).
    #[must_use]
    pub fn basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = Some(basename.into());
        self
    }

    /// The configured tags.
    pub fn tag_list(&self) -> &[String] {
        &self.tags
    }

    /// Requested operations intersected with what the ViewSet supports.
    pub fn effective_operations(&self) -> AppResult<Operations> {
        let supported: Operations = V::OPERATIONS.parse()?;
        match &self.operations {
            Some(requested) => Ok(requested.parse::<Operations>()?.intersect(&supported)),
            None => Ok(supported),
        }
    }

    /// Builds the route table.
    pub fn build(self) -> AppResult<RouteTable> {
        let ops = self.effective_operations()?;
        let resource = Arc::new(V::resource());
        let basename = self
            .basename
            .clone()
            .unwrap_or_else(|| resource.collection.name().to_string());
        let view_name = crate::short_type_name::<V>();
        let collection_path = join(&self.prefix, "");
        let detail_path = join(&self.prefix, &format!("{{{PK_PARAM}}}"));

        let mut table = RouteTable::new();
        for action in V::actions() {
            table.push(self.action_entry(&action, &resource, &basename, view_name)?);
        }

        for route in CrudRoute::ALL {
            if !ops.contains(route.operation()) {
                continue;
            }
            let (path, suffix) = if route.is_detail() {
                (&detail_path, "detail")
            } else {
                (&collection_path, "list")
            };
            let entry = RouteEntry::new(
                vec![route.method()],
                RoutePattern::parse(path)?,
                format!("{view_name}.{}", route.action()),
                crud_handler::<V>(route, Arc::clone(&resource)),
            )
            .named(format!("{basename}-{suffix}"));
            table.push(entry);
        }

        tracing::debug!(
            viewset = view_name,
            prefix = %collection_path,
            operations = %ops,
            tags = ?self.tags,
            routes = table.len(),
            "viewset routes built"
        );
        Ok(table)
    }

    fn action_entry(
        &self,
        action: &Action<V>,
        resource: &Arc<Resource>,
        basename: &str,
        view_name: &str,
    ) -> AppResult<RouteEntry> {
        let run = action.handler_fn()?;
        let path = if action.is_detail() {
            join(&self.prefix, &format!("{{{PK_PARAM}}}/{}", action.path_segment()))
        } else {
            join(&self.prefix, &action.path_segment())
        };
        let name = action.name().to_string();
        let detail = action.is_detail();
        let resource = Arc::clone(resource);
        let route_handler = handler(move |ctx| {
            run_action::<V>(ctx, Arc::clone(&resource), name.clone(), detail, Arc::clone(&run))
        });
        Ok(RouteEntry::new(
            action.http_methods().to_vec(),
            RoutePattern::parse(&path)?,
            format!("{view_name}.{}", action.name()),
            route_handler,
        )
        .named(format!("{basename}-{}", action.route_name())))
    }
}

impl<V: ViewSet> IntoRouteTable for ViewSetRouter<V> {
    fn into_route_table(self) -> AppResult<RouteTable> {
        self.build()
    }
}

#[derive(Debug, Clone, Copy)]
enum CrudRoute {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
}

impl CrudRoute {
    const ALL: [Self; 6] = [
        Self::List,
        Self::Create,
        Self::Retrieve,
        Self::Update,
        Self::PartialUpdate,
        Self::Destroy,
    ];

    const fn operation(self) -> Operation {
        match self {
            Self::List => Operation::List,
            Self::Create => Operation::Create,
            Self::Retrieve => Operation::Retrieve,
            Self::Update | Self::PartialUpdate => Operation::Update,
            Self::Destroy => Operation::Destroy,
        }
    }

    fn method(self) -> Method {
        match self {
            Self::List | Self::Retrieve => Method::GET,
            Self::Create => Method::POST,
            Self::Update => Method::PUT,
            Self::PartialUpdate => Method::PATCH,
            Self::Destroy => Method::DELETE,
        }
    }

    const fn action(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Retrieve => "retrieve",
            Self::Update => "update",
            Self::PartialUpdate => "partial_update",
            Self::Destroy => "destroy",
        }
    }

    const fn is_detail(self) -> bool {
        !matches!(self, Self::List | Self::Create)
    }
}

fn crud_handler<V: ViewSet>(route: CrudRoute, resource: Arc<Resource>) -> RouteHandler {
    handler(move |ctx: RequestContext| {
        let resource = Arc::clone(&resource);
        async move {
            let view = V::default();
            match route {
                CrudRoute::List => view.list(ctx, &resource).await,
                CrudRoute::Create => view.create(ctx, &resource).await,
                CrudRoute::Retrieve => view.retrieve(ctx, &resource).await,
                CrudRoute::Update => view.update(ctx, &resource).await,
                CrudRoute::PartialUpdate => view.partial_update(ctx, &resource).await,
                CrudRoute::Destroy => view.destroy(ctx, &resource).await,
            }
        }
    })
}

async fn run_action<V: ViewSet>(
    mut ctx: RequestContext,
    resource: Arc<Resource>,
    name: String,
    detail: bool,
    run: ActionHandler<V>,
) -> AppResult<ApiResponse> {
    let view = V::default();
    view.initial(&mut ctx, &resource, &name).await?;
    let object = if detail {
        Some(load_object(&view, &ctx, &resource, &name).await?)
    } else {
        None
    };
    run(view, ActionRequest { ctx, resource, object }).await
}
