//! # faster-app
//!
//! A convention-driven REST toolkit for Rust.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on it for
//! the whole toolkit, or on individual crates for finer-grained control.
//!
//! ```rust,no_run
//! use faster_app::prelude::*;
//!
//! #[derive(Default)]
//! struct Notes;
//!
//! impl ViewSet for Notes {
//!     type Read = JsonRecord;
//!     type Create = JsonRecord;
//!     type Update = JsonRecord;
//!
//!     fn resource() -> Resource {
//!         Resource::new(Arc::new(MemoryCollection::new("notes")))
//!             .permission::<IsAuthenticated>()
//!     }
//! }
//!
//! # async fn run() -> AppResult<()> {
//! FasterApp::new(Settings::default())
//!     .router(Notes::router("/notes"))
//!     .run()
//!     .await
//! # }
//! ```

/// Error taxonomy, settings, logging, and the lifecycle registry.
pub use faster_app_core as core;

/// Records, predicates, querysets, and the collection contract.
pub use faster_app_db as db;

/// Request context, response envelope, route table, and route validator.
pub use faster_app_http as http;

/// JWT, authenticators, and permissions.
#[cfg(feature = "auth")]
pub use faster_app_auth as auth;

/// ViewSets, routers, throttles, middleware, and the application server.
#[cfg(feature = "views")]
pub use faster_app_views as views;

/// Test client and live server.
#[cfg(feature = "testing")]
pub use faster_app_test as test;

// Third-party crates applications almost always need alongside.
pub use async_trait::async_trait;
pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;

/// The names most applications import.
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};

    pub use faster_app_core::{
        AppError, AppLifecycle, AppRegistry, AppResult, AppState, Settings, ValidationError,
        SETTINGS,
    };
    pub use faster_app_db::{
        Collection, CollectionExt, Fields, MemoryCollection, QuerySet, Record, Q,
    };
    pub use faster_app_http::{ApiResponse, Identity, RequestContext};

    #[cfg(feature = "auth")]
    pub use faster_app_auth::{
        AllowAny, Authentication, IsAdminUser, IsAuthenticated, IsOwner, IsOwnerOrReadOnly,
        JwtAuthentication, NoAuthentication, Permission, TokenAuthentication,
    };

    #[cfg(feature = "views")]
    pub use faster_app_views::viewsets::{
        AnonRateThrottle, FieldFilter, FilterBackend, FilterKind, OrderingFilter, ScopedRateThrottle,
        SearchFilter, SimpleRateThrottle, UserRateThrottle, MODEL_OPERATIONS, READ_ONLY_OPERATIONS,
    };
    #[cfg(feature = "views")]
    pub use faster_app_views::{
        Action, ActionRequest, FasterApp, JsonRecord, Middleware, ReadRepresentation, Resource,
        ViewSet, WriteRepresentation,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_exposes_core_types() {
        let err = AppError::not_found("missing");
        assert_eq!(err.status_code(), 404);
        assert_eq!(Settings::default().pagination.default_size, 20);
    }

    #[cfg(feature = "views")]
    #[test]
    fn test_prelude_builds_an_app() {
        #[derive(Default)]
        struct Notes;

        impl ViewSet for Notes {
            type Read = JsonRecord;
            type Create = JsonRecord;
            type Update = JsonRecord;

            fn resource() -> Resource {
                Resource::new(Arc::new(MemoryCollection::new("notes")))
            }
        }

        assert!(FasterApp::new(Settings::default())
            .router(Notes::router("/notes"))
            .build()
            .is_ok());
    }
}
