//! Input records

use crate::{Expr, Value};
use indexmap::IndexMap;

/// What a caller supplies for one field of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A plain value, sent as a bound parameter
    Value(Value),
    /// A server-side expression, compiled into the statement text
    Expr(Expr),
    /// Let the database fill in the column default
    Default,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<Expr> for FieldValue {
    fn from(expr: Expr) -> Self {
        FieldValue::Expr(expr)
    }
}

/// One row to write: an ordered mapping of logical field name to value.
///
/// Fields the record does not mention are written as the column default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a plain value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style setter for a server-side expression
    pub fn with_expr(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.values.insert(name.into(), FieldValue::Expr(expr));
        self
    }

    /// Insert or replace any kind of field value
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style setter asking for the column default
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.values.insert(name.into(), FieldValue::Default);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values
            .insert(name.into(), FieldValue::Value(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
