//! # faster-app-db
//!
//! The collection contract ViewSets are written against: typed lookup
//! operands, `Q` predicates, lazy querysets, JSON records, and an in-memory
//! collection that implements the contract without any external storage.

pub mod collection;
pub mod memory;
pub mod query;
pub mod record;
pub mod value;

pub use collection::{Collection, CollectionExt};
pub use memory::{KeyStrategy, MemoryCollection};
pub use query::{Lookup, OrderBy, Query, QuerySet, Q};
pub use record::{Fields, Record};
pub use value::Value;
