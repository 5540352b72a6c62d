//! A stored row, represented as a JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The field map of a record.
pub type Fields = Map<String, JsonValue>;

/// One row of a collection.
///
/// Serializes transparently as the underlying JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Fields,
}

impl Record {
    /// Wraps a field map.
    pub const fn new(fields: Fields) -> Self {
        Self { fields }
    }

    /// Builds a record from a JSON value; anything but an object yields `None`.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Returns a top-level field.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    /// Resolves a `__`-separated path into nested objects, e.g. `owner__id`.
    pub fn get_path(&self, path: &str) -> Option<&JsonValue> {
        let mut parts = path.split("__");
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Returns a field rendered as a plain string (strings unquoted, numbers as digits).
    pub fn get_text(&self, field: &str) -> Option<String> {
        crate::value::json_text(self.get_path(field)?)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: JsonValue) -> Option<JsonValue> {
        self.fields.insert(field.into(), value)
    }

    /// Copies every entry of `changes` over this record.
    pub fn apply(&mut self, changes: Fields) {
        for (key, value) in changes {
            self.fields.insert(key, value);
        }
    }

    /// Borrows the field map.
    pub const fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consumes the record, returning the field map.
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Converts the record into a JSON object value.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.fields.clone())
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self { fields }
    }
}
