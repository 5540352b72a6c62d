//! Filter backends.
//!
//! A filter backend rewrites the lazy [`QuerySet`] of a list request. Backends
//! run in the order the resource declares them and never touch storage
//! themselves; the list pipeline evaluates the final queryset once.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use faster_app_core::{AppError, AppResult};
use faster_app_db::{Lookup, OrderBy, QuerySet, Value, Q};
use faster_app_http::RequestContext;

use super::base::Resource;
use crate::short_type_name;

/// A queryset transformation driven by the request.
#[async_trait]
pub trait FilterBackend: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Returns the filtered queryset.
    async fn filter_queryset(
        &self,
        ctx: &RequestContext,
        queryset: QuerySet,
        resource: &Resource,
    ) -> AppResult<QuerySet>;
}

/// Runs a chain of backends in order.
pub async fn filter_queryset(
    backends: &[std::sync::Arc<dyn FilterBackend>],
    ctx: &RequestContext,
    mut queryset: QuerySet,
    resource: &Resource,
) -> AppResult<QuerySet> {
    for backend in backends {
        queryset = backend.filter_queryset(ctx, queryset, resource).await?;
        tracing::trace!(backend = backend.name(), "applied filter backend");
    }
    Ok(queryset)
}

// ── SearchFilter ────────────────────────────────────────────────────

/// OR-combined search across the resource's `search_fields`.
///
/// Field prefixes pick the match kind: `^name` and `=name` match the whole
/// value, `@name` and a bare `name` match a case-insensitive substring.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    /// Query parameter holding the search term.
    pub search_param: String,
    /// Overrides the resource's search fields when non-empty.
    pub search_fields: Vec<String>,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            search_param: "search".to_string(),
            search_fields: Vec::new(),
        }
    }
}

impl SearchFilter {
    /// Builds the search predicate for `term`.
    pub fn search_predicate(fields: &[String], term: &str) -> Option<Q> {
        let conditions = fields
            .iter()
            .map(|field| {
                if let Some(name) = field.strip_prefix('^').or_else(|| field.strip_prefix('=')) {
                    Q::filter(name, Lookup::Exact(Value::from(term)))
                } else if let Some(name) = field.strip_prefix('@') {
                    Q::filter(name, Lookup::IContains(term.to_string()))
                } else {
                    Q::filter(field.as_str(), Lookup::IContains(term.to_string()))
                }
            })
            .collect();
        Q::any(conditions)
    }
}

#[async_trait]
impl FilterBackend for SearchFilter {
    async fn filter_queryset(
        &self,
        ctx: &RequestContext,
        queryset: QuerySet,
        resource: &Resource,
    ) -> AppResult<QuerySet> {
        let Some(term) = ctx.query().get_trimmed(&self.search_param) else {
            return Ok(queryset);
        };
        let fields = if self.search_fields.is_empty() {
            &resource.search_fields
        } else {
            &self.search_fields
        };
        Ok(match Self::search_predicate(fields, term) {
            Some(q) => queryset.filter(q),
            None => queryset,
        })
    }
}

// ── OrderingFilter ──────────────────────────────────────────────────

/// Client-selected ordering restricted to the resource's `ordering_fields`.
///
/// Unknown fields are dropped silently. With nothing usable in the request
/// the resource's default `ordering` applies. An empty allow-list accepts
/// every field.
#[derive(Debug, Clone)]
pub struct OrderingFilter {
    /// Query parameter holding the comma-separated ordering.
    pub ordering_param: String,
}

impl Default for OrderingFilter {
    fn default() -> Self {
        Self {
            ordering_param: "ordering".to_string(),
        }
    }
}

impl OrderingFilter {
    /// Parses and filters a raw ordering parameter.
    pub fn valid_ordering(raw: &str, allowed: &[String]) -> Vec<OrderBy> {
        raw.split(',')
            .filter_map(OrderBy::parse)
            .filter(|term| allowed.is_empty() || allowed.iter().any(|f| *f == term.field))
            .collect()
    }
}

#[async_trait]
impl FilterBackend for OrderingFilter {
    async fn filter_queryset(
        &self,
        ctx: &RequestContext,
        queryset: QuerySet,
        resource: &Resource,
    ) -> AppResult<QuerySet> {
        if let Some(raw) = ctx.query().get_trimmed(&self.ordering_param) {
            let terms = Self::valid_ordering(raw, &resource.ordering_fields);
            if !terms.is_empty() {
                return Ok(queryset.order_by(terms));
            }
        }
        let default: Vec<OrderBy> = resource
            .ordering
            .iter()
            .filter_map(|term| OrderBy::parse(term))
            .collect();
        Ok(if default.is_empty() {
            queryset
        } else {
            queryset.order_by(default)
        })
    }
}

// ── FieldFilter ─────────────────────────────────────────────────────

/// The comparison a declared filter field performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Exact,
    IContains,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Comma-separated list of accepted values.
    In,
    /// `true` selects null or missing values, anything else non-null ones.
    IsNull,
}

impl FilterKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IContains => "icontains",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::IsNull => "isnull",
        }
    }

    /// Turns a raw query parameter value into a lookup.
    pub fn lookup(self, raw: &str) -> Lookup {
        match self {
            Self::Exact => Lookup::Exact(Value::from(raw)),
            Self::IContains => Lookup::IContains(raw.to_string()),
            Self::Gt => Lookup::Gt(Value::from(raw)),
            Self::Gte => Lookup::Gte(Value::from(raw)),
            Self::Lt => Lookup::Lt(Value::from(raw)),
            Self::Lte => Lookup::Lte(Value::from(raw)),
            Self::In => Lookup::In(
                raw.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(Value::from)
                    .collect(),
            ),
            Self::IsNull => Lookup::IsNull(raw.trim().eq_ignore_ascii_case("true")),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "exact" => Self::Exact,
            "icontains" => Self::IContains,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "isnull" => Self::IsNull,
            other => {
                return Err(AppError::improperly_configured(format!(
                    "Unknown filter kind '{other}'"
                )))
            }
        })
    }
}

/// Declarative per-field filtering from the resource's `filter_fields`.
///
/// Only fields present in both the declaration and the query string take
/// part; conditions are AND-combined.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldFilter;

#[async_trait]
impl FilterBackend for FieldFilter {
    async fn filter_queryset(
        &self,
        ctx: &RequestContext,
        queryset: QuerySet,
        resource: &Resource,
    ) -> AppResult<QuerySet> {
        let conditions: Vec<Q> = resource
            .filter_fields
            .iter()
            .filter_map(|(field, kind)| {
                ctx.query()
                    .get(field)
                    .map(|raw| Q::filter(field.as_str(), kind.lookup(raw)))
            })
            .collect();
        Ok(if conditions.is_empty() {
            queryset
        } else {
            queryset.filter(Q::And(conditions))
        })
    }
}
