//! The storage contract consumed by ViewSets.
//!
//! Storage engines implement [`Collection`]; the rest of the toolkit only ever
//! talks to this trait and to [`QuerySet`], never to an engine directly.

use std::sync::Arc;

use async_trait::async_trait;
use faster_app_core::AppResult;

use crate::query::{Query, QuerySet};
use crate::record::{Fields, Record};

/// A backing store for one resource type.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use faster_app_db::collection::{Collection, CollectionExt};
/// use faster_app_db::memory::MemoryCollection;
///
/// let notes: Arc<dyn Collection> = Arc::new(MemoryCollection::new("notes"));
/// let qs = notes.all();
/// assert!(qs.query().where_clause.is_none());
/// ```
#[async_trait]
pub trait Collection: Send + Sync + 'static {
    /// Name of the collection, used in logs and error messages.
    fn name(&self) -> &str;

    /// Name of the primary key field.
    fn pk_field(&self) -> &str {
        "id"
    }

    /// Counts rows matching `query`, honoring offset and limit.
    async fn count(&self, query: &Query) -> AppResult<usize>;

    /// Returns rows matching `query`, ordered and sliced.
    async fn fetch(&self, query: &Query) -> AppResult<Vec<Record>>;

    /// Looks a row up by primary key.
    async fn get(&self, pk: &str) -> AppResult<Option<Record>>;

    /// Inserts a row and returns it as stored (with its primary key).
    async fn create(&self, fields: Fields) -> AppResult<Record>;

    /// Persists an existing row.
    async fn save(&self, record: &Record) -> AppResult<()>;

    /// Deletes an existing row.
    async fn delete(&self, record: &Record) -> AppResult<()>;
}

/// Queryset entry point for shared collections.
pub trait CollectionExt {
    /// Returns a queryset selecting every row.
    fn all(&self) -> QuerySet;
}

impl CollectionExt for Arc<dyn Collection> {
    fn all(&self) -> QuerySet {
        QuerySet::all(Arc::clone(self))
    }
}
