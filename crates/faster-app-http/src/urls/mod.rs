//! URL routing: `{param}` patterns, ordered route tables, and startup
//! conflict validation.

pub mod pattern;
pub mod resolver;
pub mod validator;

pub use pattern::{join, RoutePattern};
pub use resolver::{handler, Resolution, RouteEntry, RouteHandler, RouteTable};
pub use validator::{ConflictKind, RouteConflict, RouteRecord, RouteSummary, RouteValidator, ValidationMode};
