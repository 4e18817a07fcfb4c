//! Value coercion: record values to wire-ready slots

use crate::{
    ExprScope, FieldSpec, FieldValue, Record, Result, SqlDialect, TableSchema, Value,
};
use chrono::{DateTime, Utc};

/// A record value after coercion, ready to be materialized into a row.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSlot {
    /// Sent as a bound parameter
    Literal(Value),
    /// Compiled SQL text, inlined into the statement
    Expression(String),
    /// The `DEFAULT` keyword
    DatabaseDefault,
}

impl ValueSlot {
    pub fn is_default(&self) -> bool {
        matches!(self, ValueSlot::DatabaseDefault)
    }

    /// Whether the slot consumes a positional parameter
    pub fn is_parameter(&self) -> bool {
        matches!(self, ValueSlot::Literal(_))
    }
}

/// Coerce one field of a record. A field the record does not mention is
/// written as the column default.
pub fn coerce(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    field: &FieldSpec,
    value: Option<&FieldValue>,
) -> Result<ValueSlot> {
    match value {
        None | Some(FieldValue::Default) => Ok(ValueSlot::DatabaseDefault),
        Some(FieldValue::Value(value)) => Ok(ValueSlot::Literal(
            dialect.coerce_scalar(field, value.clone())?,
        )),
        Some(FieldValue::Expr(expr)) => Ok(ValueSlot::Expression(dialect.compile_expression(
            expr,
            table,
            &ExprScope::values(),
        )?)),
    }
}

/// Coerce the given fields of every record, row by row.
pub fn coerce_rows(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    fields: &[&FieldSpec],
    records: &[Record],
) -> Result<Vec<Vec<ValueSlot>>> {
    records
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|field| coerce(dialect, table, field, lookup(record, field)))
                .collect()
        })
        .collect()
}

/// Look a field up in a record by logical name, falling back to the column name
pub(crate) fn lookup<'r>(record: &'r Record, field: &FieldSpec) -> Option<&'r FieldValue> {
    record
        .get(&field.name)
        .or_else(|| record.get(&field.column))
}

/// Fail if any record names a field the table does not have.
pub(crate) fn validate_record_fields(table: &TableSchema, records: &[Record]) -> Result<()> {
    for record in records {
        for (name, _) in record.iter() {
            table.resolve(name)?;
        }
    }
    Ok(())
}

/// Set every auto-timestamp field of every record to `now`, typed to match
/// the column.
pub fn fill_auto_timestamps(table: &TableSchema, records: &mut [Record], now: DateTime<Utc>) {
    let stamped: Vec<(&str, Value)> = table
        .concrete_fields()
        .filter(|f| f.is_auto_timestamp())
        .map(|f| (f.name.as_str(), timestamp_for(&f.sql_type, now)))
        .collect();
    if stamped.is_empty() {
        return;
    }

    for record in records.iter_mut() {
        for (name, value) in &stamped {
            record.set(*name, value.clone());
        }
    }
}

fn timestamp_for(sql_type: &str, now: DateTime<Utc>) -> Value {
    let sql_type = sql_type.to_lowercase();
    if sql_type.starts_with("date") {
        Value::Date(now.date_naive())
    } else if sql_type.starts_with("timestamp") && !sql_type.contains("with time zone") {
        Value::DateTime(now.naive_utc())
    } else {
        Value::DateTimeUtc(now)
    }
}
