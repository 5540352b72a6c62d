//! Query lookups and Q objects for building filters.
//!
//! [`Lookup`] is a field-level comparison and [`Q`] combines lookups with
//! AND, OR, and NOT. Collections evaluate a `Q` tree against their records;
//! [`Q::matches`] is the reference evaluation over JSON records.
//!
//! # Examples
//!
//! ```
//! use faster_app_db::query::lookups::{Q, Lookup};
//! use faster_app_db::value::Value;
//!
//! // name = "Alice" AND age > 25
//! let q = Q::filter("name", Lookup::Exact(Value::from("Alice")))
//!     & Q::filter("age", Lookup::Gt(Value::from(25)));
//!
//! // name = "Alice" OR name = "Bob"
//! let either = Q::filter("name", Lookup::Exact(Value::from("Alice")))
//!     | Q::filter("name", Lookup::Exact(Value::from("Bob")));
//!
//! // NOT(active = false)
//! let negated = !Q::filter("active", Lookup::Exact(Value::from(false)));
//! ```

use std::cmp::Ordering;
use std::ops;

use serde_json::Value as JsonValue;

use crate::record::Record;
use crate::value::{json_text, Value};

/// A field-level lookup operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exact match (`field = value`).
    Exact(Value),
    /// Case-insensitive exact match.
    IExact(String),
    /// Substring match.
    Contains(String),
    /// Case-insensitive substring match.
    IContains(String),
    /// Membership test.
    In(Vec<Value>),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Prefix match.
    StartsWith(String),
    /// Case-insensitive prefix match.
    IStartsWith(String),
    /// Suffix match.
    EndsWith(String),
    /// Case-insensitive suffix match.
    IEndsWith(String),
    /// Inclusive range test.
    Range(Value, Value),
    /// NULL test; `IsNull(true)` also matches a missing field.
    IsNull(bool),
}

impl Lookup {
    /// Returns the conventional lookup name (`exact`, `icontains`, ...).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::IExact(_) => "iexact",
            Self::Contains(_) => "contains",
            Self::IContains(_) => "icontains",
            Self::In(_) => "in",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::StartsWith(_) => "startswith",
            Self::IStartsWith(_) => "istartswith",
            Self::EndsWith(_) => "endswith",
            Self::IEndsWith(_) => "iendswith",
            Self::Range(_, _) => "range",
            Self::IsNull(_) => "isnull",
        }
    }

    /// Evaluates the lookup against a field value; `None` means the field is absent.
    pub fn matches(&self, field: Option<&JsonValue>) -> bool {
        let field = match (self, field) {
            (Self::IsNull(expected), field) => {
                return field.map_or(true, JsonValue::is_null) == *expected;
            }
            (_, None) => return false,
            (_, Some(field)) => field,
        };

        match self {
            Self::Exact(v) => v.matches_json(field),
            Self::In(values) => values.iter().any(|v| v.matches_json(field)),
            Self::Gt(v) => v.compare_json(field) == Some(Ordering::Greater),
            Self::Gte(v) => matches!(
                v.compare_json(field),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt(v) => v.compare_json(field) == Some(Ordering::Less),
            Self::Lte(v) => matches!(
                v.compare_json(field),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Range(low, high) => {
                matches!(
                    low.compare_json(field),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    high.compare_json(field),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            Self::IExact(s) => text_match(field, |t| t.to_lowercase() == s.to_lowercase()),
            Self::Contains(s) => text_match(field, |t| t.contains(s.as_str())),
            Self::IContains(s) => {
                text_match(field, |t| t.to_lowercase().contains(&s.to_lowercase()))
            }
            Self::StartsWith(s) => text_match(field, |t| t.starts_with(s.as_str())),
            Self::IStartsWith(s) => {
                text_match(field, |t| t.to_lowercase().starts_with(&s.to_lowercase()))
            }
            Self::EndsWith(s) => text_match(field, |t| t.ends_with(s.as_str())),
            Self::IEndsWith(s) => {
                text_match(field, |t| t.to_lowercase().ends_with(&s.to_lowercase()))
            }
            Self::IsNull(_) => false,
        }
    }
}

fn text_match(field: &JsonValue, pred: impl Fn(&str) -> bool) -> bool {
    json_text(field).is_some_and(|text| pred(&text))
}

/// A composable query filter.
///
/// `Q` objects can be combined using `&` (AND), `|` (OR), and `!` (NOT).
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single field lookup.
    Filter {
        /// The field name; `__` walks into nested objects.
        field: String,
        /// The lookup operation.
        lookup: Lookup,
    },
    /// Logical AND of multiple conditions.
    And(Vec<Q>),
    /// Logical OR of multiple conditions.
    Or(Vec<Q>),
    /// Logical negation of a condition.
    Not(Box<Q>),
}

impl Q {
    /// Creates a new filter Q object.
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }

    /// Shorthand for an exact-match filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::filter(field, Lookup::Exact(value.into()))
    }

    /// Returns `true` if this is an empty AND or OR.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// OR-combines a list of conditions; `None` when the list is empty.
    pub fn any(conditions: Vec<Self>) -> Option<Self> {
        conditions.into_iter().reduce(|acc, q| acc | q)
    }

    /// Evaluates the predicate against a record.
    ///
    /// An empty AND is true and an empty OR is false.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Filter { field, lookup } => lookup.matches(record.get_path(field)),
            Self::And(children) => children.iter().all(|q| q.matches(record)),
            Self::Or(children) => children.iter().any(|q| q.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ANDs
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ORs
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        // Double negation cancellation
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}
