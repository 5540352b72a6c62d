//! Lookup operand values.
//!
//! Records are stored as JSON, but the operands of a lookup usually come from
//! query-string text. [`Value`] is the typed operand, and
//! [`Value::compare_json`] applies the loose coercions needed to compare it
//! against a stored JSON field (`"3"` equals `3`, `"true"` equals `true`, an
//! RFC 3339 string orders against a timestamp).

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value as JsonValue;

/// A typed operand for a [`Lookup`](crate::query::lookups::Lookup).
///
/// # Examples
///
/// ```
/// use faster_app_db::value::Value;
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
///
/// let v = Value::from("hello");
/// assert_eq!(v, Value::String("hello".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// JSON null.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// A date and time with UTC timezone.
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// A UUID value.
    Uuid(uuid::Uuid),
    /// A list of values (for `in` lookups).
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::DateTimeTz(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            JsonValue::String(s) => Self::String(s.clone()),
            JsonValue::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            JsonValue::Object(_) => Self::String(v.to_string()),
        }
    }
}

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the operand into JSON, e.g. for echoing it back in error data.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => JsonValue::from(*f),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::DateTimeTz(dt) => JsonValue::String(dt.to_rfc3339()),
            Self::Uuid(u) => JsonValue::String(u.to_string()),
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Compares a stored JSON field against this operand.
    ///
    /// Returns `None` when the two cannot be compared (for instance a string
    /// that does not parse as a number against a numeric field). `None` never
    /// matches any lookup.
    pub fn compare_json(&self, field: &JsonValue) -> Option<Ordering> {
        match (field, self) {
            (JsonValue::Null, Self::Null) => Some(Ordering::Equal),
            (JsonValue::Null, _) | (_, Self::Null) => None,

            (JsonValue::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (JsonValue::Bool(a), Self::String(s)) => parse_bool(s).map(|b| a.cmp(&b)),

            (JsonValue::Number(n), Self::Int(b)) => n
                .as_i64()
                .map_or_else(|| n.as_f64().and_then(|a| a.partial_cmp(&(*b as f64))), |a| Some(a.cmp(b))),
            (JsonValue::Number(n), Self::Float(b)) => n.as_f64().and_then(|a| a.partial_cmp(b)),
            (JsonValue::Number(n), Self::String(s)) => {
                let b = s.trim().parse::<f64>().ok()?;
                n.as_f64().and_then(|a| a.partial_cmp(&b))
            }
            (JsonValue::Number(n), Self::Bool(b)) => n.as_i64().map(|a| a.cmp(&i64::from(*b))),

            (JsonValue::String(a), Self::String(b)) => Some(a.as_str().cmp(b.as_str())),
            (JsonValue::String(a), Self::Int(b)) => {
                let a = a.trim().parse::<f64>().ok()?;
                a.partial_cmp(&(*b as f64))
            }
            (JsonValue::String(a), Self::Float(b)) => {
                let a = a.trim().parse::<f64>().ok()?;
                a.partial_cmp(b)
            }
            (JsonValue::String(a), Self::Bool(b)) => parse_bool(a).map(|a| a.cmp(b)),
            (JsonValue::String(a), Self::DateTimeTz(b)) => chrono::DateTime::parse_from_rfc3339(a)
                .ok()
                .map(|a| a.with_timezone(&chrono::Utc).cmp(b)),
            (JsonValue::String(a), Self::Uuid(b)) => {
                uuid::Uuid::parse_str(a).ok().map(|a| a.cmp(b))
            }

            (_, Self::List(_)) => None,
            (other, operand) => Some(other.to_string().cmp(&operand.to_string())),
        }
    }

    /// Returns `true` if the stored field equals this operand after coercion.
    pub fn matches_json(&self, field: &JsonValue) -> bool {
        self.compare_json(field) == Some(Ordering::Equal)
    }
}

/// Renders a stored JSON field as text for substring lookups.
///
/// Null has no text form; containers are rendered as compact JSON.
pub fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_primitives() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42_i32), Value::Int(42));
        assert_eq!(Value::from(1.5_f64), Value::Float(1.5));
        assert_eq!(Value::from("a"), Value::String("a".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from(&json!(3)), Value::Int(3));
        assert_eq!(Value::from(&json!(2.5)), Value::Float(2.5));
        assert_eq!(
            Value::from(&json!(["a", 1])),
            Value::List(vec![Value::from("a"), Value::Int(1)])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("x")]).to_string(),
            "[1, x]"
        );
    }

    #[test]
    fn test_text_operand_against_numbers() {
        assert!(Value::from("3").matches_json(&json!(3)));
        assert!(Value::from("3.0").matches_json(&json!(3)));
        assert_eq!(Value::from("10").compare_json(&json!(9)), Some(Ordering::Less));
        assert_eq!(Value::from("abc").compare_json(&json!(9)), None);
    }

    #[test]
    fn test_text_operand_against_bool() {
        assert!(Value::from("true").matches_json(&json!(true)));
        assert!(Value::from("0").matches_json(&json!(false)));
        assert!(!Value::from("maybe").matches_json(&json!(false)));
    }

    #[test]
    fn test_strings_compare_lexically() {
        assert_eq!(
            Value::from("2024-01-02").compare_json(&json!("2024-01-01")),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_null_only_equals_null() {
        assert!(Value::Null.matches_json(&JsonValue::Null));
        assert_eq!(Value::from("x").compare_json(&JsonValue::Null), None);
    }

    #[test]
    fn test_uuid_and_datetime_operands() {
        let id = uuid::Uuid::new_v4();
        assert!(Value::from(id).matches_json(&json!(id.to_string())));

        let ts = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            Value::from(ts).compare_json(&json!("2024-05-01T11:00:00+00:00")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_json_text() {
        assert_eq!(json_text(&json!("a")).as_deref(), Some("a"));
        assert_eq!(json_text(&json!(12)).as_deref(), Some("12"));
        assert_eq!(json_text(&JsonValue::Null), None);
    }
}
