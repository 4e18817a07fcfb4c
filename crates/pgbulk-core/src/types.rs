//! Field values and returned rows

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A field value as written to, or read back from, a column.
///
/// NUMERIC travels as its decimal text so no precision is lost on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    /// `timestamp` (no zone)
    DateTime(NaiveDateTime),
    /// `timestamptz`, normalized to UTC
    DateTimeUtc(DateTime<Utc>),
    Json(serde_json::Value),
    /// One-dimensional array; elements may be `Null`
    Array(Vec<Value>),
}

impl Value {
    /// Integer value of any width. Numeric strings parse too.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Lossy float view of any numeric value, used for ordering and float
    /// column coercion
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            Value::Int16(v) => Some(f64::from(*v)),
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Decimal(s) | Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Convert into a JSON document, used when a non-JSON value is written to
    /// a `json`/`jsonb` column.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(*v),
            Value::Int16(v) => Json::from(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::Float32(v) => Json::from(f64::from(*v)),
            Value::Float64(v) => Json::from(*v),
            Value::Decimal(v) => v
                .parse::<serde_json::Number>()
                .map(Json::Number)
                .unwrap_or_else(|_| Json::String(v.clone())),
            Value::String(v) => Json::String(v.clone()),
            Value::Json(v) => v.clone(),
            Value::Array(v) => Json::Array(v.iter().map(Value::to_json).collect()),
            other => Json::String(other.to_string()),
        }
    }
}

/// Text form used in messages, JSON fallbacks and the text copy format
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => fmt::Display::fmt(v, f),
            Value::Int16(v) => fmt::Display::fmt(v, f),
            Value::Int32(v) => fmt::Display::fmt(v, f),
            Value::Int64(v) => fmt::Display::fmt(v, f),
            Value::Float32(v) => fmt::Display::fmt(v, f),
            Value::Float64(v) => fmt::Display::fmt(v, f),
            Value::Decimal(v) | Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => fmt::Display::fmt(v, f),
            Value::Date(v) => fmt::Display::fmt(v, f),
            Value::Time(v) => fmt::Display::fmt(v, f),
            Value::DateTime(v) => fmt::Display::fmt(v, f),
            Value::DateTimeUtc(v) => f.write_str(&v.to_rfc3339()),
            Value::Json(v) => fmt::Display::fmt(v, f),
            Value::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeUtc,
    serde_json::Value => Json,
    Vec<Value> => Array,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A returned row: values in select-list order, addressed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
    columns: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Remove a column, returning its value if it was present
    pub fn take_column(&mut self, name: &str) -> Option<Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.columns.remove(idx);
        Some(self.values.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_take_column_removes_name_and_value() {
        let mut row = Row::new(
            vec!["id".into(), "_status".into(), "name".into()],
            vec![Value::Int32(1), Value::from("c"), Value::from("a")],
        );
        assert_eq!(row.take_column("_status"), Some(Value::from("c")));
        assert_eq!(row.take_column("_status"), None);
        assert_eq!(row.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(row.get_by_name("name"), Some(&Value::from("a")));
    }

    #[test]
    fn test_display_matches_server_text() {
        assert_eq!(Value::Decimal("12.50".into()).to_string(), "12.50");
        assert_eq!(Value::Float64(-2.25).to_string(), "-2.25");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Json(serde_json::json!({"a": 1})).to_string(), "{\"a\":1}");
    }

    #[test]
    fn test_to_json_keeps_decimal_precision() {
        assert_eq!(
            Value::Array(vec![Value::Decimal("1.5".into()), Value::Null]).to_json(),
            serde_json::json!([1.5, null])
        );
    }
}
