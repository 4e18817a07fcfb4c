//! Row materializer: coerced rows to VALUES lists

use crate::{FieldSpec, SqlDialect, Value, ValueSlot};

/// VALUES rows as SQL fragments plus the parameters they bind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedRows {
    /// One entry per row, one SQL fragment per column
    pub rows: Vec<Vec<String>>,
    pub params: Vec<Value>,
}

impl MaterializedRows {
    /// Parenthesized value lists, e.g. `($1::integer, $2::text)`
    pub fn value_lists(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| format!("({})", row.join(", ")))
            .collect()
    }

    /// `VALUES (...), (...)`
    pub fn values_clause(&self) -> String {
        format!("VALUES {}", self.value_lists().join(", "))
    }
}

/// Materialize coerced rows.
///
/// Each column is cast to its SQL type exactly once, at its first
/// occurrence. That is row 0 unless row 0 asks for the column default, in
/// which case the first row supplying a value carries the cast. Later rows
/// take their types from the first.
pub fn materialize(
    dialect: &dyn SqlDialect,
    fields: &[&FieldSpec],
    rows: Vec<Vec<ValueSlot>>,
) -> MaterializedRows {
    let mut cast_pending = vec![true; fields.len()];
    let mut out = MaterializedRows {
        rows: Vec::with_capacity(rows.len()),
        params: Vec::new(),
    };

    for row in rows {
        let mut sql_row = Vec::with_capacity(fields.len());
        for (idx, (field, slot)) in fields.iter().zip(row).enumerate() {
            let fragment = match slot {
                ValueSlot::DatabaseDefault => {
                    sql_row.push("DEFAULT".to_string());
                    continue;
                }
                ValueSlot::Literal(value) => {
                    out.params.push(value);
                    dialect.placeholder(out.params.len())
                }
                ValueSlot::Expression(sql) if cast_pending[idx] => format!("({})", sql),
                ValueSlot::Expression(sql) => sql,
            };

            if cast_pending[idx] {
                cast_pending[idx] = false;
                sql_row.push(dialect.cast(&fragment, &field.sql_type));
            } else {
                sql_row.push(fragment);
            }
        }
        out.rows.push(sql_row);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PostgresDialect;
    use pretty_assertions::assert_eq;

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("id", "integer"),
            FieldSpec::new("name", "varchar(64)"),
        ]
    }

    #[test]
    fn test_casts_only_first_row() {
        let fields = fields();
        let refs: Vec<&FieldSpec> = fields.iter().collect();
        let rows = vec![
            vec![ValueSlot::Literal(Value::Int32(1)), ValueSlot::Literal("a".into())],
            vec![ValueSlot::Literal(Value::Int32(2)), ValueSlot::Literal("b".into())],
        ];
        let out = materialize(&PostgresDialect, &refs, rows);
        assert_eq!(
            out.value_lists(),
            vec!["($1::integer, $2::varchar(64))", "($3, $4)"]
        );
        assert_eq!(out.params.len(), 4);
    }

    #[test]
    fn test_default_slot_defers_cast_and_binds_nothing() {
        let fields = fields();
        let refs: Vec<&FieldSpec> = fields.iter().collect();
        let rows = vec![
            vec![ValueSlot::Literal(Value::Int32(1)), ValueSlot::DatabaseDefault],
            vec![ValueSlot::Literal(Value::Int32(2)), ValueSlot::Literal("b".into())],
        ];
        let out = materialize(&PostgresDialect, &refs, rows);
        assert_eq!(
            out.value_lists(),
            vec!["($1::integer, DEFAULT)", "($2, $3::varchar(64))"]
        );
        assert_eq!(out.params, vec![Value::Int32(1), Value::Int32(2), "b".into()]);
    }

    #[test]
    fn test_expression_slots_are_inlined() {
        let fields = fields();
        let refs: Vec<&FieldSpec> = fields.iter().collect();
        let rows = vec![
            vec![ValueSlot::Expression("1 + 1".into()), ValueSlot::Literal("a".into())],
            vec![ValueSlot::Expression("3".into()), ValueSlot::Literal("b".into())],
        ];
        let out = materialize(&PostgresDialect, &refs, rows);
        assert_eq!(
            out.values_clause(),
            "VALUES ((1 + 1)::integer, $1::varchar(64)), (3, $2)"
        );
    }
}
