//! The standard CRUD operations.
//!
//! Each mixin has a blanket implementation for every [`ViewSet`], so the
//! router can call `list`, `create` and friends on any of them. Behavior is
//! customized through the ViewSet's pipeline methods and hooks, not by
//! overriding these.

use async_trait::async_trait;
use faster_app_core::{AppError, AppResult, SETTINGS};
use faster_app_db::{Fields, Record};
use faster_app_http::{ApiResponse, RequestContext};
use serde_json::json;

use super::base::{Resource, ViewSet};
use super::representation::{ReadRepresentation, WriteRepresentation};
use crate::pagination::{Page, PageParams};

/// Path parameter holding the primary key in detail routes.
pub const PK_PARAM: &str = "id";

async fn render<V: ViewSet>(record: &Record) -> AppResult<serde_json::Value> {
    <V::Read as ReadRepresentation>::render(record).await
}

/// Loads the target record of a detail request and checks object permissions.
pub async fn load_object<V: ViewSet>(
    view: &V,
    ctx: &RequestContext,
    resource: &Resource,
    action: &str,
) -> AppResult<Record> {
    let pk = ctx.require_path_param(PK_PARAM)?;
    let instance = view.get_object_or_404(ctx, resource, pk).await?;
    view.check_object_permissions(ctx, resource, action, &instance).await?;
    Ok(instance)
}

// ── List ────────────────────────────────────────────────────────────

#[async_trait]
pub trait ListModelMixin: ViewSet {
    /// `GET /`: filtered, ordered, paginated records.
    async fn list(&self, mut ctx: RequestContext, resource: &Resource) -> AppResult<ApiResponse> {
        self.initial(&mut ctx, resource, "list").await?;
        let limits = resource
            .pagination
            .clone()
            .unwrap_or_else(|| SETTINGS.get().pagination.clone());
        let params = PageParams::from_query(ctx.query(), &limits)?;

        let queryset = self.get_queryset(&ctx, resource).await?;
        let queryset = self.filter_queryset(&ctx, queryset, resource).await?;
        let page = Page::build(queryset, params, |record| async move {
            render::<Self>(&record).await
        })
        .await?;

        let data = serde_json::to_value(page)
            .map_err(|e| AppError::internal("Failed to serialize page").with_detail(e.to_string()))?;
        Ok(ApiResponse::success(data))
    }
}

#[async_trait]
impl<V: ViewSet> ListModelMixin for V {}

// ── Create ──────────────────────────────────────────────────────────

#[async_trait]
pub trait CreateModelMixin: ViewSet {
    /// `POST /`: validates the body, runs the create hooks, inserts.
    async fn create(&self, mut ctx: RequestContext, resource: &Resource) -> AppResult<ApiResponse> {
        self.initial(&mut ctx, resource, "create").await?;
        let body: Self::Create = ctx.json()?;
        body.validate()?;
        let mut fields: Fields = body.to_fields(true)?;
        fields.remove(resource.pk_field());

        let fields = self.perform_create_hook(&ctx, fields).await?;
        let record = resource.collection.create(fields).await?;
        let record = self.perform_create_after_hook(&ctx, record).await?;
        tracing::debug!(
            collection = resource.collection.name(),
            pk = ?record.get(resource.pk_field()),
            "record created"
        );
        Ok(ApiResponse::created(render::<Self>(&record).await?))
    }
}

#[async_trait]
impl<V: ViewSet> CreateModelMixin for V {}

// ── Retrieve ────────────────────────────────────────────────────────

#[async_trait]
pub trait RetrieveModelMixin: ViewSet {
    /// `GET /{id}`.
    async fn retrieve(&self, mut ctx: RequestContext, resource: &Resource) -> AppResult<ApiResponse> {
        self.initial(&mut ctx, resource, "retrieve").await?;
        let instance = load_object(self, &ctx, resource, "retrieve").await?;
        Ok(ApiResponse::success(render::<Self>(&instance).await?))
    }
}

#[async_trait]
impl<V: ViewSet> RetrieveModelMixin for V {}

// ── Update ──────────────────────────────────────────────────────────

#[async_trait]
pub trait UpdateModelMixin: ViewSet {
    /// `PUT /{id}`: every field of the update body is written.
    async fn update(&self, ctx: RequestContext, resource: &Resource) -> AppResult<ApiResponse> {
        self.perform_update(ctx, resource, false).await
    }

    /// `PATCH /{id}`: only the fields the client sent are written.
    async fn partial_update(&self, ctx: RequestContext, resource: &Resource) -> AppResult<ApiResponse> {
        self.perform_update(ctx, resource, true).await
    }

    /// Shared body of `update` and `partial_update`.
    async fn perform_update(
        &self,
        mut ctx: RequestContext,
        resource: &Resource,
        partial: bool,
    ) -> AppResult<ApiResponse> {
        let action = if partial { "partial_update" } else { "update" };
        self.initial(&mut ctx, resource, action).await?;
        let instance = load_object(self, &ctx, resource, action).await?;

        let body: Self::Update = ctx.json()?;
        body.validate()?;
        let mut fields: Fields = body.to_fields(partial)?;
        fields.remove(resource.pk_field());

        let fields = self.perform_update_hook(&ctx, &instance, fields).await?;
        let mut updated = instance;
        updated.apply(fields);
        resource.collection.save(&updated).await?;

        // Re-read so storage-managed fields such as `updated_at` are current.
        let pk = ctx.require_path_param(PK_PARAM)?;
        let stored = resource.collection.get(pk).await?.unwrap_or(updated);
        let record = self.perform_update_after_hook(&ctx, stored).await?;
        Ok(ApiResponse::success(render::<Self>(&record).await?))
    }
}

#[async_trait]
impl<V: ViewSet> UpdateModelMixin for V {}

// ── Destroy ─────────────────────────────────────────────────────────

#[async_trait]
pub trait DestroyModelMixin: ViewSet {
    /// `DELETE /{id}`. A vetoing destroy hook leaves the record in place.
    async fn destroy(&self, mut ctx: RequestContext, resource: &Resource) -> AppResult<ApiResponse> {
        self.initial(&mut ctx, resource, "destroy").await?;
        let instance = load_object(self, &ctx, resource, "destroy").await?;

        if !self.perform_destroy_hook(&ctx, &instance).await? {
            let pk = ctx.require_path_param(PK_PARAM)?;
            return Err(AppError::not_found("Cannot delete this record").with_data(json!({ "pk": pk })));
        }
        resource.collection.delete(&instance).await?;
        self.perform_destroy_after_hook(&ctx, &instance).await?;
        tracing::debug!(
            collection = resource.collection.name(),
            pk = ?instance.get(resource.pk_field()),
            "record deleted"
        );
        Ok(ApiResponse::deleted())
    }
}

#[async_trait]
impl<V: ViewSet> DestroyModelMixin for V {}
