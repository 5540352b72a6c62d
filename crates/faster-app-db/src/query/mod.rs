//! Query construction: predicates and lazy querysets.

pub mod lookups;
pub mod queryset;

pub use lookups::{Lookup, Q};
pub use queryset::{OrderBy, Query, QuerySet};
