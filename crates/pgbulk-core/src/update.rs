//! Bulk update statement builder
//!
//! `UPDATE t SET col = "new_values".col FROM (VALUES ...) AS "new_values"(pk, ...)
//! WHERE t.pk = "new_values".pk`, keyed by the primary key.

use crate::{
    BulkError, ExprScope, FieldSpec, Record, Result, SqlDialect, Statement, TableSchema,
    UpdateOptions, UpdateSpec, ValueSlot, clause, coerce, materialize, sort,
};
use chrono::{DateTime, Utc};

const NEW_VALUES: &str = "new_values";

/// Build the update statement for a batch. Returns `None` when the batch or
/// the resolved update-field list is empty.
pub fn build_update(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    records: Vec<Record>,
    update: &UpdateSpec,
    options: &UpdateOptions,
    now: DateTime<Utc>,
) -> Result<Option<Statement>> {
    let pk = table.require_primary_key("update")?;
    let directives = clause::resolve_update_directives(table, update, &[pk], &options.exclude)?;
    let returning = clause::resolve_returning(table, &options.returning)?;
    coerce::validate_record_fields(table, &records)?;

    if records.is_empty() || directives.is_empty() {
        tracing::debug!(
            table = %table.display_name(),
            records = records.len(),
            fields = directives.len(),
            "nothing to update"
        );
        return Ok(None);
    }

    // The joined VALUES list carries the key, every updated field and
    // any field an expression reads the proposed value of.
    let mut columns: Vec<&FieldSpec> = vec![pk];
    for directive in &directives {
        if !columns.iter().any(|c| c.name == directive.field.name) {
            columns.push(directive.field);
        }
    }
    for directive in &directives {
        let Some(expr) = &directive.expression else {
            continue;
        };
        for name in expr.proposed_fields() {
            let field = table.resolve(name)?;
            if !columns.iter().any(|c| c.name == field.name) {
                columns.push(field);
            }
        }
    }

    let mut records = records;
    coerce::fill_auto_timestamps(table, &mut records, now);
    let records = sort::sort_by_key(dialect, table, records, &[pk])?;
    let rows = coerce::coerce_rows(dialect, table, &columns, &records)?;
    for row in &rows {
        if let Some(idx) = row.iter().position(ValueSlot::is_default) {
            return Err(BulkError::Configuration(format!(
                "update of {} needs a value for '{}' in every record; \
                 database defaults cannot be used in a joined VALUES list",
                table.display_name(),
                columns[idx].name
            )));
        }
    }

    let alias = dialect.quote_identifier(&table.name);
    let joined = dialect.quote_identifier(NEW_VALUES);
    let scope = ExprScope::conflict(&alias, &joined);
    let values = clause::assignment_values(dialect, table, &directives, &scope)?;
    let rows = materialize::materialize(dialect, &columns, rows);
    let pk_column = dialect.quote_identifier(&pk.column);

    let mut sql = format!(
        "UPDATE {} AS {} SET {} FROM ({}) AS {}({}) WHERE {}.{} = {}.{}",
        dialect.quote_table(table),
        alias,
        clause::set_clause(dialect, &directives, &values),
        rows.values_clause(),
        joined,
        clause::column_list(dialect, &columns),
        alias,
        pk_column,
        joined,
        pk_column,
    );
    if options.suppress_redundant {
        sql.push_str(" AND ");
        sql.push_str(&clause::redundant_guard(dialect, &alias, &directives, &values));
    }
    if options.returning.is_requested() {
        sql.push_str(" RETURNING ");
        sql.push_str(&clause::returning_list(dialect, &alias, &returning).join(", "));
    }

    tracing::debug!(sql_len = sql.len(), params = rows.params.len(), "built update");
    Ok(Some(Statement::new(sql, rows.params)))
}
