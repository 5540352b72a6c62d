//! # faster-app-views
//!
//! ViewSets and everything around them.
//!
//! - [`viewsets`]: the [`ViewSet`] trait, CRUD mixins, custom actions,
//!   filter backends, throttles, and representations
//! - [`router`]: turns a ViewSet into a route table
//! - [`pagination`]: page/size query handling
//! - [`middleware`]: request/response middleware and the builtin stack
//! - [`health`]: `/`, `/health` and `/ready`
//! - [`server`]: the [`FasterApp`] builder that ties it all together
//! - [`tasks`]: detached background work

pub mod health;
pub mod middleware;
pub mod pagination;
pub mod router;
pub mod server;
pub mod tasks;
pub mod viewsets;

pub use middleware::{Middleware, MiddlewarePipeline};
pub use pagination::{Page, PageParams};
pub use router::{IntoRouteTable, Operation, Operations, ViewSetRouter};
pub use server::FasterApp;
pub use viewsets::{
    Action, ActionRequest, CreateModelMixin, DestroyModelMixin, JsonRecord, ListModelMixin,
    ReadRepresentation, Resource, RetrieveModelMixin, Throttle, UpdateModelMixin, ViewSet,
    WriteRepresentation,
};

/// Last path segment of a type name, without generics.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
