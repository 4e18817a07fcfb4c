//! SQL dialect capability interface
//!
//! Everything the statement builders need to know about the target backend
//! goes through [`SqlDialect`]: identifier quoting, placeholders, casts,
//! literal rendering, scalar coercion and expression compilation. The
//! builders never inspect backend details on their own.

use crate::{BulkError, Expr, ExprScope, FieldSpec, Result, TableSchema, Value};

pub trait SqlDialect: Send + Sync {
    /// Dialect identifier, e.g. "postgresql"
    fn name(&self) -> &'static str;

    /// Quote an identifier (column, table or alias name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Quoted, optionally schema-qualified table name
    fn quote_table(&self, table: &TableSchema) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table.name)
            ),
            None => self.quote_identifier(&table.name),
        }
    }

    /// Positional parameter placeholder, 1-based
    fn placeholder(&self, position: usize) -> String;

    /// Apply an explicit type cast to an SQL fragment
    fn cast(&self, sql: &str, sql_type: &str) -> String;

    /// Render a value as an inline SQL literal
    fn literal(&self, value: &Value) -> String;

    /// Convert a caller value into the form the wire protocol expects for
    /// the given field.
    fn coerce_scalar(&self, field: &FieldSpec, value: Value) -> Result<Value>;

    /// Column type name accepted by the bulk-load protocol (no precision,
    /// scale or length qualifiers).
    fn copy_wire_type(&self, sql_type: &str) -> String;

    /// Compile an expression to SQL text. Field references are resolved
    /// against `table`; references that traverse relations are rejected.
    fn compile_expression(
        &self,
        expr: &Expr,
        table: &TableSchema,
        scope: &ExprScope<'_>,
    ) -> Result<String> {
        match expr {
            Expr::Column(name) => {
                let prefix = scope.existing.ok_or_else(|| {
                    BulkError::Configuration(format!(
                        "expression references existing value of '{}' where no row is available",
                        name
                    ))
                })?;
                let field = resolve_expression_field(table, name)?;
                Ok(format!("{}.{}", prefix, self.quote_identifier(&field.column)))
            }
            Expr::Proposed(name) => {
                let prefix = scope.proposed.ok_or_else(|| {
                    BulkError::Configuration(format!(
                        "expression references proposed value of '{}' where no row is available",
                        name
                    ))
                })?;
                let field = resolve_expression_field(table, name)?;
                Ok(format!("{}.{}", prefix, self.quote_identifier(&field.column)))
            }
            Expr::Literal(value) => Ok(self.literal(value)),
            Expr::Raw(sql) => Ok(sql.clone()),
            Expr::Binary { op, left, right } => Ok(format!(
                "({} {} {})",
                self.compile_expression(left, table, scope)?,
                op.as_sql(),
                self.compile_expression(right, table, scope)?
            )),
            Expr::Function { name, args } => {
                if name.is_empty()
                    || !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                {
                    return Err(BulkError::Configuration(format!(
                        "invalid function name '{}' in expression",
                        name
                    )));
                }
                let args = args
                    .iter()
                    .map(|arg| self.compile_expression(arg, table, scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({})", name, args.join(", ")))
            }
        }
    }
}

fn resolve_expression_field<'t>(table: &'t TableSchema, name: &str) -> Result<&'t FieldSpec> {
    if name.contains('.') {
        return Err(BulkError::Configuration(format!(
            "expression '{}' traverses a relation; joined field references are not allowed",
            name
        )));
    }
    table.resolve(name)
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn cast(&self, sql: &str, sql_type: &str) -> String {
        format!("{}::{}", sql, sql_type)
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Float32(v) if v.is_finite() => v.to_string(),
            Value::Float64(v) if v.is_finite() => v.to_string(),
            Value::Float32(v) => format!("'{}'::float4", pg_special_float(*v as f64)),
            Value::Float64(v) => format!("'{}'::float8", pg_special_float(*v)),
            Value::Decimal(v) => format!("'{}'::numeric", v.replace('\'', "''")),
            Value::String(v) => format!("'{}'", v.replace('\'', "''")),
            Value::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
                format!("'\\x{}'::bytea", hex)
            }
            Value::Uuid(v) => format!("'{}'::uuid", v),
            Value::Json(v) => format!("'{}'", v.to_string().replace('\'', "''")),
            Value::DateTimeUtc(v) => format!("'{}'::timestamptz", v.to_rfc3339()),
            Value::Date(v) => format!("'{}'::date", v),
            Value::Time(v) => format!("'{}'::time", v),
            Value::DateTime(v) => format!("'{}'::timestamp", v),
            Value::Array(arr) if arr.is_empty() => "'{}'".to_string(),
            Value::Array(arr) => {
                let values: Vec<String> = arr.iter().map(|v| self.literal(v)).collect();
                format!("ARRAY[{}]", values.join(", "))
            }
        }
    }

    fn coerce_scalar(&self, field: &FieldSpec, value: Value) -> Result<Value> {
        coerce_for_type(field, &self.copy_wire_type(&field.sql_type), value)
    }

    fn copy_wire_type(&self, sql_type: &str) -> String {
        strip_type_qualifiers(sql_type)
    }
}

fn pg_special_float(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Remove `(...)` qualifiers from a type name and normalize whitespace:
/// `character varying(128)[]` becomes `character varying[]`.
pub fn strip_type_qualifiers(sql_type: &str) -> String {
    let mut out = String::with_capacity(sql_type.len());
    let mut depth = 0usize;
    for ch in sql_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" []", "[]")
        .to_lowercase()
}

fn out_of_range(field: &FieldSpec, value: i64) -> BulkError {
    BulkError::Configuration(format!(
        "value {} is out of range for field '{}' of type {}",
        value, field.name, field.sql_type
    ))
}

/// Pick the value variant matching the column type so the driver writes
/// the correct binary width.
fn coerce_for_type(field: &FieldSpec, base_type: &str, value: Value) -> Result<Value> {
    if let Some(element_type) = base_type.strip_suffix("[]") {
        return match value {
            Value::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(|item| coerce_for_type(field, element_type, item))
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Ok(other),
        };
    }

    let integer = value.as_i64().filter(|_| {
        matches!(value, Value::Int16(_) | Value::Int32(_) | Value::Int64(_))
    });

    let coerced = match (base_type, value) {
        (_, Value::Null) => Value::Null,
        ("smallint" | "int2", v) => match integer {
            Some(i) => Value::Int16(i16::try_from(i).map_err(|_| out_of_range(field, i))?),
            None => v,
        },
        ("integer" | "int" | "int4" | "serial", v) => match integer {
            Some(i) => Value::Int32(i32::try_from(i).map_err(|_| out_of_range(field, i))?),
            None => v,
        },
        ("bigint" | "int8" | "bigserial", v) => match integer {
            Some(i) => Value::Int64(i),
            None => v,
        },
        ("real" | "float4", v) => match v.as_f64() {
            Some(f) if !matches!(v, Value::String(_) | Value::Decimal(_)) => Value::Float32(f as f32),
            _ => v,
        },
        ("double precision" | "float8", v) => match v.as_f64() {
            Some(f) if !matches!(v, Value::String(_) | Value::Decimal(_)) => Value::Float64(f),
            _ => v,
        },
        ("numeric" | "decimal", v) => match v {
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_) => {
                Value::Decimal(v.to_string())
            }
            other => other,
        },
        ("json" | "jsonb", v) => match v {
            Value::Json(_) | Value::String(_) => v,
            other => Value::Json(other.to_json()),
        },
        ("uuid", Value::String(s)) => match uuid::Uuid::parse_str(&s) {
            Ok(id) => Value::Uuid(id),
            Err(_) => Value::String(s),
        },
        ("timestamp with time zone" | "timestamptz", Value::DateTime(naive)) => {
            Value::DateTimeUtc(naive.and_utc())
        }
        ("timestamp without time zone" | "timestamp", Value::DateTimeUtc(ts)) => {
            Value::DateTime(ts.naive_utc())
        }
        ("date", Value::DateTimeUtc(ts)) => Value::Date(ts.date_naive()),
        ("date", Value::DateTime(naive)) => Value::Date(naive.date()),
        (_, v) => v,
    };
    Ok(coerced)
}
