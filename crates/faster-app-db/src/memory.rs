//! An in-memory [`Collection`].
//!
//! Rows live in insertion order behind a `tokio` read-write lock. Predicates
//! are evaluated with [`Q::matches`](crate::query::Q::matches) and ordering is
//! a stable multi-key sort, so equal keys keep insertion order and repeated
//! reads return identical results.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use faster_app_core::{AppError, AppResult};
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;

use crate::collection::Collection;
use crate::query::{OrderBy, Query};
use crate::record::{Fields, Record};
use crate::value::json_text;

/// How primary keys are assigned to new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Random v4 UUID strings.
    #[default]
    Uuid,
    /// Integers starting at 1.
    AutoIncrement,
}

/// A collection held entirely in process memory.
pub struct MemoryCollection {
    name: String,
    pk_field: String,
    keys: KeyStrategy,
    timestamps: bool,
    rows: RwLock<Vec<Record>>,
    next_id: AtomicU64,
}

impl MemoryCollection {
    /// Creates an empty collection with UUID keys in the `id` field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pk_field: "id".to_string(),
            keys: KeyStrategy::Uuid,
            timestamps: false,
            rows: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Uses a different primary key field.
    #[must_use]
    pub fn with_pk_field(mut self, field: impl Into<String>) -> Self {
        self.pk_field = field.into();
        self
    }

    /// Chooses how primary keys are generated.
    #[must_use]
    pub const fn with_keys(mut self, keys: KeyStrategy) -> Self {
        self.keys = keys;
        self
    }

    /// Stamps `created_at` on insert and `updated_at` on insert and save.
    #[must_use]
    pub const fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn pk_of(&self, record: &Record) -> Option<String> {
        record.get(&self.pk_field).and_then(json_text)
    }

    fn generate_key(&self) -> JsonValue {
        match self.keys {
            KeyStrategy::Uuid => JsonValue::String(uuid::Uuid::new_v4().to_string()),
            KeyStrategy::AutoIncrement => {
                json!(self.next_id.fetch_add(1, AtomicOrdering::SeqCst))
            }
        }
    }

    fn select(&self, rows: &[Record], query: &Query) -> Vec<Record> {
        let mut selected: Vec<Record> = rows
            .iter()
            .filter(|row| query.where_clause.as_ref().map_or(true, |q| q.matches(row)))
            .cloned()
            .collect();

        if !query.order_by.is_empty() {
            selected.sort_by(|a, b| compare_rows(a, b, &query.order_by));
        }

        let iter = selected.into_iter().skip(query.offset);
        match query.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn pk_field(&self) -> &str {
        &self.pk_field
    }

    async fn count(&self, query: &Query) -> AppResult<usize> {
        let rows = self.rows.read().await;
        let total = rows
            .iter()
            .filter(|row| query.where_clause.as_ref().map_or(true, |q| q.matches(row)))
            .count();
        Ok(query.sliced_len(total))
    }

    async fn fetch(&self, query: &Query) -> AppResult<Vec<Record>> {
        let rows = self.rows.read().await;
        Ok(self.select(&rows, query))
    }

    async fn get(&self, pk: &str) -> AppResult<Option<Record>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|row| self.pk_of(row).as_deref() == Some(pk))
            .cloned())
    }

    async fn create(&self, fields: Fields) -> AppResult<Record> {
        let mut record = Record::new(fields);
        let mut rows = self.rows.write().await;

        match self.pk_of(&record) {
            Some(pk) if rows.iter().any(|row| self.pk_of(row).as_deref() == Some(pk.as_str())) => {
                return Err(AppError::conflict(format!(
                    "{} with {} '{pk}' already exists",
                    self.name, self.pk_field
                ))
                .with_data(json!({ self.pk_field.clone(): pk })));
            }
            Some(_) => {}
            None => {
                record.set(self.pk_field.clone(), self.generate_key());
            }
        }

        if self.timestamps {
            let now = JsonValue::String(chrono::Utc::now().to_rfc3339());
            record.set("created_at", now.clone());
            record.set("updated_at", now);
        }

        rows.push(record.clone());
        tracing::debug!(collection = %self.name, pk = ?self.pk_of(&record), "row created");
        Ok(record)
    }

    async fn save(&self, record: &Record) -> AppResult<()> {
        let pk = self.pk_of(record).ok_or_else(|| {
            AppError::bad_request(format!("{} row has no {}", self.name, self.pk_field))
        })?;

        let mut rows = self.rows.write().await;
        let slot = rows
            .iter_mut()
            .find(|row| self.pk_of(row).as_deref() == Some(pk.as_str()))
            .ok_or_else(|| {
                AppError::not_found(format!("{} '{pk}' does not exist", self.name))
                    .with_data(json!({ "pk": pk }))
            })?;

        let mut updated = record.clone();
        if self.timestamps {
            updated.set(
                "updated_at",
                JsonValue::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        *slot = updated;
        Ok(())
    }

    async fn delete(&self, record: &Record) -> AppResult<()> {
        let pk = self.pk_of(record).ok_or_else(|| {
            AppError::bad_request(format!("{} row has no {}", self.name, self.pk_field))
        })?;

        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| self.pk_of(row).as_deref() != Some(pk.as_str()));
        if rows.len() == before {
            return Err(AppError::not_found(format!("{} '{pk}' does not exist", self.name))
                .with_data(json!({ "pk": pk })));
        }
        tracing::debug!(collection = %self.name, %pk, "row deleted");
        Ok(())
    }
}

fn compare_rows(a: &Record, b: &Record, order_by: &[OrderBy]) -> Ordering {
    for term in order_by {
        let ord = compare_json(a.get_path(&term.field), b.get_path(&term.field));
        let ord = if term.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order over optional JSON values: missing < null < bool < number < string < other.
fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    const fn rank(v: Option<&JsonValue>) -> u8 {
        match v {
            None => 0,
            Some(JsonValue::Null) => 1,
            Some(JsonValue::Bool(_)) => 2,
            Some(JsonValue::Number(_)) => 3,
            Some(JsonValue::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == rank(b) => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Lookup, Q};
    use crate::value::Value;

    fn fields(value: JsonValue) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_assigns_uuid_key() {
        let c = MemoryCollection::new("notes");
        let row = c.create(fields(json!({"title": "x"}))).await.unwrap();
        let id = row.get_text("id").unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(c.get(&id).await.unwrap(), Some(row));
    }

    #[tokio::test]
    async fn test_auto_increment_and_custom_pk() {
        let c = MemoryCollection::new("tags")
            .with_pk_field("pk")
            .with_keys(KeyStrategy::AutoIncrement);
        let a = c.create(fields(json!({"label": "a"}))).await.unwrap();
        let b = c.create(fields(json!({"label": "b"}))).await.unwrap();
        assert_eq!(a.get("pk"), Some(&json!(1)));
        assert_eq!(b.get("pk"), Some(&json!(2)));
        assert!(c.get("2").await.unwrap().is_some());
        assert_eq!(c.pk_field(), "pk");
    }

    #[tokio::test]
    async fn test_create_with_duplicate_key_conflicts() {
        let c = MemoryCollection::new("notes");
        c.create(fields(json!({"id": "n1"}))).await.unwrap();
        let err = c.create(fields(json!({"id": "n1"}))).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_timestamps() {
        let c = MemoryCollection::new("notes").with_timestamps();
        let row = c.create(fields(json!({"title": "x"}))).await.unwrap();
        assert!(row.get("created_at").is_some());
        assert_eq!(row.get("created_at"), row.get("updated_at"));
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let c = MemoryCollection::new("notes");
        let mut row = c.create(fields(json!({"title": "x"}))).await.unwrap();
        row.set("title", json!("y"));
        c.save(&row).await.unwrap();
        let id = row.get_text("id").unwrap();
        assert_eq!(c.get(&id).await.unwrap().unwrap().get("title"), Some(&json!("y")));

        c.delete(&row).await.unwrap();
        assert!(c.get(&id).await.unwrap().is_none());
        assert!(c.is_empty().await);
        assert_eq!(c.delete(&row).await.unwrap_err().status_code(), 404);
        assert_eq!(c.save(&row).await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_fetch_filters_orders_and_slices() {
        let c = MemoryCollection::new("people");
        for (name, age) in [("ann", 30), ("bob", 25), ("cat", 30), ("dan", 41)] {
            c.create(fields(json!({"name": name, "age": age}))).await.unwrap();
        }

        let query = Query {
            where_clause: Some(Q::filter("age", Lookup::Gte(Value::from(30)))),
            order_by: vec![OrderBy::desc("age"), OrderBy::asc("name")],
            offset: 0,
            limit: None,
        };
        let names: Vec<String> = c
            .fetch(&query)
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.get_text("name"))
            .collect();
        assert_eq!(names, vec!["dan", "ann", "cat"]);

        let sliced = Query {
            offset: 1,
            limit: Some(1),
            ..query
        };
        assert_eq!(c.count(&sliced).await.unwrap(), 1);
        assert_eq!(c.fetch(&sliced).await.unwrap()[0].get_text("name").unwrap(), "ann");
    }

    #[test]
    fn test_compare_json_ranks() {
        assert_eq!(compare_json(None, Some(&JsonValue::Null)), Ordering::Less);
        assert_eq!(
            compare_json(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_json(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
        assert_eq!(
            compare_json(Some(&json!(1)), Some(&json!("1"))),
            Ordering::Less
        );
    }
}
