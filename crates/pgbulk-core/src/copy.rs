//! Bulk copy builder
//!
//! Builds the `COPY ... FROM STDIN` header and the coerced rows streamed
//! after it. Rows are coerced up front so a record that asks for a database
//! default or carries an expression fails before anything is sent.

use crate::{
    BulkError, CopyOptions, FieldSpec, Record, Result, SqlDialect, TableSchema, Value, ValueSlot,
    clause, coerce,
};
use std::fmt::Write as _;

/// One column of a copy, with the type name used to negotiate the binary
/// wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyColumn {
    pub name: String,
    pub column: String,
    /// Column type without precision, scale or length qualifiers
    pub wire_type: String,
}

/// The copy header statement and its column layout
#[derive(Debug, Clone, PartialEq)]
pub struct CopyStatement {
    pub sql: String,
    pub columns: Vec<CopyColumn>,
    pub binary: bool,
}

/// Build the copy header and coerce every record into a row of values.
///
/// An empty `fields` list copies every concrete field that is not
/// auto-generated. Returns `None` for an empty batch.
pub fn build_copy(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    records: &[Record],
    fields: &[&str],
    options: &CopyOptions,
) -> Result<Option<(CopyStatement, Vec<Vec<Value>>)>> {
    let excluded = table.resolve_all(&options.exclude)?;
    let selected: Vec<&FieldSpec> = if fields.is_empty() {
        table
            .concrete_fields()
            .filter(|f| !f.auto_generated)
            .collect()
    } else {
        table.resolve_all(fields)?
    };
    let columns: Vec<&FieldSpec> = selected
        .into_iter()
        .filter(|f| !excluded.iter().any(|e| e.name == f.name))
        .collect();
    if columns.is_empty() {
        return Err(BulkError::Builder(format!(
            "no columns to copy into {}",
            table.display_name()
        )));
    }
    if let Some(field) = columns.iter().find(|f| !f.concrete) {
        return Err(BulkError::Configuration(format!(
            "field '{}' is not backed by a column and cannot be copied",
            field.name
        )));
    }
    coerce::validate_record_fields(table, records)?;

    if records.is_empty() {
        tracing::debug!(table = %table.display_name(), "empty batch, skipping copy");
        return Ok(None);
    }

    let rows = coerce::coerce_rows(dialect, table, &columns, records)?
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&columns)
                .map(|(slot, field)| match slot {
                    ValueSlot::Literal(value) => Ok(value),
                    ValueSlot::DatabaseDefault => Err(BulkError::Configuration(format!(
                        "copy cannot use the database default for '{}'; \
                         supply an explicit value for every copied field",
                        field.name
                    ))),
                    ValueSlot::Expression(_) => Err(BulkError::Configuration(format!(
                        "copy cannot evaluate expressions; '{}' needs a plain value",
                        field.name
                    ))),
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sql = format!(
        "COPY {} ({}) FROM STDIN",
        dialect.quote_table(table),
        clause::column_list(dialect, &columns)
    );
    if options.binary {
        sql.push_str(" WITH (FORMAT binary)");
    }

    let statement = CopyStatement {
        sql,
        columns: columns
            .iter()
            .map(|f| CopyColumn {
                name: f.name.clone(),
                column: f.column.clone(),
                wire_type: dialect.copy_wire_type(&f.sql_type),
            })
            .collect(),
        binary: options.binary,
    };
    Ok(Some((statement, rows)))
}

/// Encode one row in the text copy format, newline included.
pub fn encode_text_row(values: &[Value]) -> String {
    let mut line = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            line.push('\t');
        }
        match value {
            Value::Null => line.push_str("\\N"),
            other => escape_text(&mut line, &text_value(other)),
        }
    }
    line.push('\n');
    line
}

fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
}

/// Server text representation of a non-null value
fn text_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => if *v { "t" } else { "f" }.to_string(),
        Value::Float32(v) => float_text(*v as f64),
        Value::Float64(v) => float_text(*v),
        Value::Bytes(bytes) => {
            let mut hex = String::with_capacity(2 + bytes.len() * 2);
            hex.push_str("\\x");
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            hex
        }
        Value::DateTimeUtc(v) => v.to_rfc3339(),
        Value::Array(items) => array_text(items),
        other => other.to_string(),
    }
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        v.to_string()
    }
}

/// Array literal: `{1,2}`, `{"a b","c\"d",NULL}`
fn array_text(items: &[Value]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => "NULL".to_string(),
            Value::Array(inner) => array_text(inner),
            other => {
                let text = text_value(other);
                format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
            }
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expr, PostgresDialect};
    use pretty_assertions::assert_eq;

    fn table() -> TableSchema {
        TableSchema::new("readings")
            .with_schema("metrics")
            .field(FieldSpec::new("id", "bigint").primary_key().auto_generated())
            .field(FieldSpec::new("sensor", "character varying(40)"))
            .field(FieldSpec::new("value", "numeric(8,3)"))
            .field(FieldSpec::new("tags", "varchar(16)[]"))
    }

    #[test]
    fn test_copy_header_and_wire_types() {
        let records = vec![Record::new()
            .with("sensor", "s1")
            .with("value", Value::Decimal("1.250".into()))
            .with("tags", Value::Array(vec!["a".into()]))];
        let (stmt, rows) = build_copy(
            &PostgresDialect,
            &table(),
            &records,
            &[],
            &CopyOptions::default().binary(true),
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            stmt.sql,
            "COPY \"metrics\".\"readings\" (\"sensor\", \"value\", \"tags\") \
             FROM STDIN WITH (FORMAT binary)"
        );
        let types: Vec<_> = stmt.columns.iter().map(|c| c.wire_type.as_str()).collect();
        assert_eq!(types, vec!["character varying", "numeric", "varchar[]"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::from("s1"));
    }

    #[test]
    fn test_copy_named_fields_and_exclude() {
        let records = vec![Record::new().with("sensor", "s1").with("value", 1_i32)];
        let (stmt, _) = build_copy(
            &PostgresDialect,
            &table(),
            &records,
            &["sensor", "value", "tags"],
            &CopyOptions::default().exclude(["tags"]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            stmt.sql,
            "COPY \"metrics\".\"readings\" (\"sensor\", \"value\") FROM STDIN"
        );
    }

    #[test]
    fn test_copy_rejects_database_default() {
        let records = vec![Record::new().with("sensor", "s1")];
        let err = build_copy(
            &PostgresDialect,
            &table(),
            &records,
            &["sensor", "value"],
            &CopyOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("explicit value"));
    }

    #[test]
    fn test_copy_rejects_expressions() {
        let records = vec![Record::new().with_expr("sensor", Expr::raw("upper('x')"))];
        let err = build_copy(
            &PostgresDialect,
            &table(),
            &records,
            &["sensor"],
            &CopyOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_copy_empty_batch() {
        let out = build_copy(&PostgresDialect, &table(), &[], &[], &CopyOptions::default())
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_encode_text_row_escapes() {
        let row = vec![
            Value::Int32(1),
            Value::Null,
            Value::from("tab\there\nnew\\line"),
            Value::Bytes(vec![0xde, 0xad]),
            Value::Bool(true),
            Value::Float64(f64::NEG_INFINITY),
        ];
        assert_eq!(
            encode_text_row(&row),
            "1\t\\N\ttab\\there\\nnew\\\\line\t\\\\xdead\tt\t-Infinity\n"
        );
    }

    #[test]
    fn test_encode_text_array() {
        let row = vec![Value::Array(vec![
            Value::from("a b"),
            Value::from("q\"t"),
            Value::Null,
        ])];
        assert_eq!(encode_text_row(&row), "{\"a b\",\"q\\\\\"t\",NULL}\n");
    }
}
