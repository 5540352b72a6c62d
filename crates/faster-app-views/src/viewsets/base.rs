//! The ViewSet trait and its per-type [`Resource`] configuration.
//!
//! A ViewSet bundles a collection, its representations, and the request
//! pipeline (throttles, authenticators, permissions, filter backends). The
//! CRUD operations live in [`super::mixins`]; everything here is either
//! configuration or an overridable step of the pipeline.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use faster_app_auth::{Authentication, Permission};
use faster_app_core::settings::PaginationSettings;
use faster_app_core::{AppError, AppResult};
use faster_app_db::{Collection, CollectionExt, Fields, QuerySet, Record, Q};
use faster_app_http::RequestContext;
use serde_json::json;

use super::actions::Action;
use super::components;
use super::filters::{self, FilterBackend, FilterKind};
use super::representation::{ReadRepresentation, WriteRepresentation};
use super::throttling::{self, Throttle};
use crate::router::ViewSetRouter;

/// Everything the pipeline needs to know about a ViewSet.
///
/// All chains start empty: no throttling, anonymous requests, allow all, no
/// filtering.
#[derive(Clone)]
pub struct Resource {
    /// Backing collection.
    pub collection: Arc<dyn Collection>,
    /// Authenticators, tried in order.
    pub authenticators: Vec<Arc<dyn Authentication>>,
    /// Permissions, all of which must pass.
    pub permissions: Vec<Arc<dyn Permission>>,
    /// Filter backends, applied in order to list querysets.
    pub filter_backends: Vec<Arc<dyn FilterBackend>>,
    /// Throttles, all of which must allow the request.
    pub throttles: Vec<Arc<dyn Throttle>>,
    /// Fields searched by [`SearchFilter`](super::filters::SearchFilter).
    pub search_fields: Vec<String>,
    /// Fields clients may order by. Empty accepts any field.
    pub ordering_fields: Vec<String>,
    /// Default ordering.
    pub ordering: Vec<String>,
    /// Fields matched by [`FieldFilter`](super::filters::FieldFilter).
    pub filter_fields: Vec<(String, FilterKind)>,
    /// Scope for [`ScopedRateThrottle`](super::throttling::ScopedRateThrottle).
    pub throttle_scope: Option<String>,
    /// Page size limits; `None` uses the global settings.
    pub pagination: Option<PaginationSettings>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("collection", &self.collection.name())
            .field(
                "authenticators",
                &self.authenticators.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field(
                "permissions",
                &self.permissions.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "filter_backends",
                &self.filter_backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field(
                "throttles",
                &self.throttles.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("throttle_scope", &self.throttle_scope)
            .finish_non_exhaustive()
    }
}

fn strings<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

impl Resource {
    /// A resource over `collection` with empty chains.
    pub fn new(collection: Arc<dyn Collection>) -> Self {
        Self {
            collection,
            authenticators: Vec::new(),
            permissions: Vec::new(),
            filter_backends: Vec::new(),
            throttles: Vec::new(),
            search_fields: Vec::new(),
            ordering_fields: Vec::new(),
            ordering: Vec::new(),
            filter_fields: Vec::new(),
            throttle_scope: None,
            pagination: None,
        }
    }

    // ── Chains ───────────────────────────────────────────────────────

    /// Appends the shared instance of an authenticator type.
    #[must_use]
    pub fn authentication<T: Authentication + Default>(mut self) -> Self {
        self.authenticators.push(components::shared::<T>());
        self
    }

    /// Appends a configured authenticator.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authentication>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    /// Appends the shared instance of a permission type.
    #[must_use]
    pub fn permission<T: Permission + Default>(mut self) -> Self {
        self.permissions.push(components::shared::<T>());
        self
    }

    /// Appends a configured permission.
    #[must_use]
    pub fn permission_instance(mut self, permission: Arc<dyn Permission>) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Appends the shared instance of a filter backend type.
    #[must_use]
    pub fn filter_backend<T: FilterBackend + Default>(mut self) -> Self {
        self.filter_backends.push(components::shared::<T>());
        self
    }

    /// Appends a configured filter backend.
    #[must_use]
    pub fn filter_backend_instance(mut self, backend: Arc<dyn FilterBackend>) -> Self {
        self.filter_backends.push(backend);
        self
    }

    /// Appends a throttle. Throttles keep counters, so they are passed in
    /// already configured rather than shared per type.
    #[must_use]
    pub fn throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttles.push(throttle);
        self
    }

    // ── Filtering ────────────────────────────────────────────────────

    /// Sets the searched fields. `^`, `=` and `@` prefixes pick the lookup.
    #[must_use]
    pub fn search_fields<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.search_fields = strings(fields);
        self
    }

    /// Sets the fields clients may order by.
    #[must_use]
    pub fn ordering_fields<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.ordering_fields = strings(fields);
        self
    }

    /// Sets the default ordering, e.g. `["-created_at"]`.
    #[must_use]
    pub fn ordering<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.ordering = strings(fields);
        self
    }

    /// Declares an exact or ranged query filter on one field.
    #[must_use]
    pub fn filter_field(mut self, field: impl Into<String>, kind: FilterKind) -> Self {
        self.filter_fields.push((field.into(), kind));
        self
    }

    // ── Misc ─────────────────────────────────────────────────────────

    /// Sets the scope read by scoped throttles.
    #[must_use]
    pub fn throttle_scope(mut self, scope: impl Into<String>) -> Self {
        self.throttle_scope = Some(scope.into());
        self
    }

    /// Overrides page size limits.
    #[must_use]
    pub const fn pagination(mut self, pagination: PaginationSettings) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Name of the primary key field.
    pub fn pk_field(&self) -> &str {
        self.collection.pk_field()
    }
}

/// Operation letters: list, create, retrieve, update, destroy.
pub const MODEL_OPERATIONS: &str = "CRUDL";

/// Operation letters of a read-only ViewSet.
pub const READ_ONLY_OPERATIONS: &str = "RL";

/// A REST resource: configuration, representations and pipeline hooks.
///
/// Only [`resource`](Self::resource) and the three representation types are
/// required. A new instance is created with `Default` for every request.
///
/// ```ignore
/// #[derive(Default)]
/// struct NoteViewSet;
///
/// impl ViewSet for NoteViewSet {
///     type Read = NoteOut;
///     type Create = NoteIn;
///     type Update = NotePatch;
///
///     fn resource() -> Resource {
///         Resource::new(notes())
///             .authentication::<JwtAuthenticationFromSettings>()
///             .permission::<IsAuthenticated>()
///             .filter_backend::<SearchFilter>()
///             .search_fields(["title"])
///     }
/// }
/// ```
#[async_trait]
pub trait ViewSet: Default + Send + Sync + 'static {
    /// Representation of records in responses.
    type Read: ReadRepresentation;
    /// Body accepted by create.
    type Create: WriteRepresentation;
    /// Body accepted by update and partial update.
    type Update: WriteRepresentation;

    /// Operations this ViewSet supports.
    const OPERATIONS: &'static str = MODEL_OPERATIONS;

    /// Builds the resource configuration. Called once per router build.
    fn resource() -> Resource;

    /// Custom actions, routed ahead of the generic ones.
    fn actions() -> Vec<Action<Self>> {
        Vec::new()
    }

    /// Starts a router for this ViewSet.
    fn router(prefix: &str) -> ViewSetRouter<Self> {
        ViewSetRouter::new(prefix)
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    /// Runs the throttle chain.
    async fn check_throttles(&self, ctx: &RequestContext, resource: &Resource) -> AppResult<()> {
        throttling::check_throttles(&resource.throttles, ctx, resource).await
    }

    /// Runs the authenticator chain. Anonymous requests are not an error here.
    async fn perform_authentication(
        &self,
        ctx: &mut RequestContext,
        resource: &Resource,
    ) -> AppResult<()> {
        faster_app_auth::authenticate(&resource.authenticators, ctx).await;
        Ok(())
    }

    /// Collection-level permission check.
    async fn check_permissions(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        action: &str,
    ) -> AppResult<()> {
        faster_app_auth::check_permissions(&resource.permissions, ctx, action).await
    }

    /// Object-level permission check.
    async fn check_object_permissions(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        action: &str,
        obj: &Record,
    ) -> AppResult<()> {
        faster_app_auth::check_object_permissions(&resource.permissions, ctx, action, obj).await
    }

    /// Throttle, authenticate, then check collection permissions.
    async fn initial(
        &self,
        ctx: &mut RequestContext,
        resource: &Resource,
        action: &str,
    ) -> AppResult<()> {
        self.check_throttles(ctx, resource).await?;
        self.perform_authentication(ctx, resource).await?;
        self.check_permissions(ctx, resource, action).await
    }

    // ── Data access ──────────────────────────────────────────────────

    /// The base queryset. Override to scope records to the caller.
    async fn get_queryset(&self, _ctx: &RequestContext, resource: &Resource) -> AppResult<QuerySet> {
        Ok(resource.collection.all())
    }

    /// Applies the filter backends.
    async fn filter_queryset(
        &self,
        ctx: &RequestContext,
        queryset: QuerySet,
        resource: &Resource,
    ) -> AppResult<QuerySet> {
        filters::filter_queryset(&resource.filter_backends, ctx, queryset, resource).await
    }

    /// Looks a record up by primary key within [`get_queryset`](Self::get_queryset).
    async fn get_object(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        pk: &str,
    ) -> AppResult<Option<Record>> {
        self.get_queryset(ctx, resource)
            .await?
            .filter(Q::eq(resource.pk_field(), pk))
            .first()
            .await
    }

    /// Like [`get_object`](Self::get_object) but a miss is `NotFound`.
    async fn get_object_or_404(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        pk: &str,
    ) -> AppResult<Record> {
        self.get_object(ctx, resource, pk).await?.ok_or_else(|| {
            AppError::not_found("Record not found").with_data(json!({ "pk": pk }))
        })
    }

    // ── Hooks ────────────────────────────────────────────────────────

    /// Adjusts fields before a create.
    async fn perform_create_hook(&self, _ctx: &RequestContext, fields: Fields) -> AppResult<Fields> {
        Ok(fields)
    }

    /// Post-processes a created record.
    async fn perform_create_after_hook(&self, _ctx: &RequestContext, record: Record) -> AppResult<Record> {
        Ok(record)
    }

    /// Adjusts changes before an update.
    async fn perform_update_hook(
        &self,
        _ctx: &RequestContext,
        _instance: &Record,
        fields: Fields,
    ) -> AppResult<Fields> {
        Ok(fields)
    }

    /// Post-processes an updated record.
    async fn perform_update_after_hook(&self, _ctx: &RequestContext, record: Record) -> AppResult<Record> {
        Ok(record)
    }

    /// Returns `false` to veto a delete.
    async fn perform_destroy_hook(&self, _ctx: &RequestContext, _instance: &Record) -> AppResult<bool> {
        Ok(true)
    }

    /// Runs after a delete.
    async fn perform_destroy_after_hook(&self, _ctx: &RequestContext, _instance: &Record) -> AppResult<()> {
        Ok(())
    }
}
