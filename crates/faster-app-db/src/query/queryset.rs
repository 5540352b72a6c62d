//! Lazy, chainable querysets.
//!
//! A [`QuerySet`] is a [`Query`] description bound to the [`Collection`] that
//! will evaluate it. Chaining methods (`filter`, `order_by`, `slice`) only
//! rewrite the description; nothing touches storage until a terminal method
//! (`count`, `fetch`, `first`, `exists`) is awaited.

use std::fmt;
use std::sync::Arc;

use faster_app_core::AppResult;

use super::lookups::Q;
use crate::collection::Collection;
use crate::record::Record;

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The field to order by; `__` walks into nested objects.
    pub field: String,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Creates a descending order.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parses `name` / `-name`.
    pub fn parse(term: &str) -> Option<Self> {
        let term = term.trim();
        match term.strip_prefix('-') {
            Some("") => None,
            Some(field) => Some(Self::desc(field)),
            None if term.is_empty() => None,
            None => Some(Self::asc(term)),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            f.write_str(&self.field)
        }
    }
}

/// A storage-agnostic description of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Combined predicate; `None` selects everything.
    pub where_clause: Option<Q>,
    /// Ordering terms, left to right.
    pub order_by: Vec<OrderBy>,
    /// Rows to skip.
    pub offset: usize,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Applies `offset`/`limit` to a total row count.
    pub fn sliced_len(&self, total: usize) -> usize {
        let remaining = total.saturating_sub(self.offset);
        self.limit.map_or(remaining, |limit| remaining.min(limit))
    }
}

/// A lazy handle over the rows of one collection.
#[derive(Clone)]
pub struct QuerySet {
    collection: Arc<dyn Collection>,
    query: Query,
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("collection", &self.collection.name())
            .field("query", &self.query)
            .finish()
    }
}

impl QuerySet {
    /// Selects every row of `collection`.
    pub fn all(collection: Arc<dyn Collection>) -> Self {
        Self {
            collection,
            query: Query::default(),
        }
    }

    /// Returns the query description.
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the backing collection.
    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    // ── Chaining (lazy) ──────────────────────────────────────────────

    /// Narrows the selection; successive filters are AND-ed.
    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        self.query.where_clause = Some(match self.query.where_clause.take() {
            Some(existing) => existing & q,
            None => q,
        });
        self
    }

    /// Removes rows matching `q`.
    #[must_use]
    pub fn exclude(self, q: Q) -> Self {
        self.filter(!q)
    }

    /// Replaces the ordering.
    #[must_use]
    pub fn order_by(mut self, fields: Vec<OrderBy>) -> Self {
        self.query.order_by = fields;
        self
    }

    /// Restricts the result window.
    #[must_use]
    pub fn slice(mut self, offset: usize, limit: usize) -> Self {
        self.query.offset = offset;
        self.query.limit = Some(limit);
        self
    }

    // ── Terminal methods ─────────────────────────────────────────────

    /// Counts matching rows, honoring any slice.
    pub async fn count(&self) -> AppResult<usize> {
        self.collection.count(&self.query).await
    }

    /// Materializes the matching rows.
    pub async fn fetch(&self) -> AppResult<Vec<Record>> {
        self.collection.fetch(&self.query).await
    }

    /// Returns the first matching row.
    pub async fn first(&self) -> AppResult<Option<Record>> {
        let mut query = self.query.clone();
        query.limit = Some(1);
        Ok(self.collection.fetch(&query).await?.into_iter().next())
    }

    /// Returns `true` if at least one row matches.
    pub async fn exists(&self) -> AppResult<bool> {
        Ok(self.first().await?.is_some())
    }
}
