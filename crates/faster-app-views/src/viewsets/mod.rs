//! ViewSets: per-collection CRUD endpoints with a configurable pipeline.

pub mod actions;
pub mod base;
pub mod components;
pub mod filters;
pub mod mixins;
pub mod representation;
pub mod throttling;

pub use actions::{Action, ActionHandler, ActionRequest};
pub use base::{Resource, ViewSet, MODEL_OPERATIONS, READ_ONLY_OPERATIONS};
pub use filters::{FieldFilter, FilterBackend, FilterKind, OrderingFilter, SearchFilter};
pub use mixins::{
    CreateModelMixin, DestroyModelMixin, ListModelMixin, RetrieveModelMixin, UpdateModelMixin,
};
pub use representation::{JsonRecord, ReadRepresentation, WriteRepresentation};
pub use throttling::{
    AnonRateThrottle, NoThrottle, Rate, ScopedRateThrottle, SimpleRateThrottle, Throttle,
    ThrottleStore, UserRateThrottle,
};
