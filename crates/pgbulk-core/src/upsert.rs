//! Upsert statement builder
//!
//! Produces `INSERT ... ON CONFLICT (...) DO UPDATE SET ... | DO NOTHING`,
//! optionally guarded against redundant updates and returning status-tagged
//! rows. With `return_untouched` the insert runs inside a CTE so rows whose
//! update was skipped can be reported too.

use crate::{
    BulkError, ExprScope, FieldSpec, Record, Result, SqlDialect, Statement, TableSchema,
    UpdateSpec, UpsertOptions, ValueSlot,
    clause::{self, UpdateDirective},
    coerce, materialize,
    result::STATUS_COLUMN,
    sort,
};
use chrono::{DateTime, Utc};

const INPUT_ROWS: &str = "input_rows";
const ROW_INDEX: &str = "_row_index";

/// Build the upsert statement for a batch. Returns `None` for an empty
/// batch, after every field name has been validated.
pub fn build_upsert(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    records: Vec<Record>,
    unique_fields: &[&str],
    update: &UpdateSpec,
    options: &UpsertOptions,
    now: DateTime<Utc>,
) -> Result<Option<Statement>> {
    if unique_fields.is_empty() {
        return Err(BulkError::Configuration(format!(
            "upsert into {} needs at least one unique field",
            table.display_name()
        )));
    }
    let keys = table.resolve_all(unique_fields)?;
    if let Some(field) = keys.iter().find(|f| !f.concrete) {
        return Err(BulkError::Configuration(format!(
            "unique field '{}' is not backed by a column",
            field.name
        )));
    }

    let directives = clause::resolve_update_directives(table, update, &keys, &options.exclude)?;
    let columns = insert_columns(table, &keys);
    if columns.is_empty() {
        return Err(BulkError::Builder(format!(
            "no insertable columns remain for {}",
            table.display_name()
        )));
    }

    // Untouched rows are reported through RETURNING, so asking for them
    // implies returning at least the primary key.
    let wants_rows = options.returning.is_requested() || options.return_untouched;
    let mut returning = clause::resolve_returning(table, &options.returning)?;
    let untouched_pk = if options.return_untouched {
        let pk = table.require_primary_key("returning untouched rows")?;
        if !returning.iter().any(|f| f.name == pk.name) {
            returning.push(pk);
        }
        Some(pk)
    } else {
        None
    };
    coerce::validate_record_fields(table, &records)?;

    if records.is_empty() {
        tracing::debug!(table = %table.display_name(), "empty batch, skipping upsert");
        return Ok(None);
    }

    let mut records = records;
    coerce::fill_auto_timestamps(table, &mut records, now);
    let records = sort::sort_by_key(dialect, table, records, &keys)?;
    let rows = coerce::coerce_rows(dialect, table, &columns, &records)?;

    let target = UpsertTarget {
        dialect,
        table,
        keys: &keys,
        columns: &columns,
        directives: &directives,
        returning: wants_rows.then_some(returning.as_slice()),
        suppress_redundant: options.suppress_redundant,
    };

    let statement = match untouched_pk {
        Some(pk) => target.untouched_statement(rows, pk)?,
        None => target.statement(rows)?,
    };
    Ok(Some(statement))
}

/// Concrete fields except auto-generated ones, unless the generated field
/// is part of the conflict target.
fn insert_columns<'t>(table: &'t TableSchema, keys: &[&FieldSpec]) -> Vec<&'t FieldSpec> {
    table
        .concrete_fields()
        .filter(|f| !f.auto_generated || keys.iter().any(|k| k.name == f.name))
        .collect()
}

struct UpsertTarget<'a, 't> {
    dialect: &'a dyn SqlDialect,
    table: &'t TableSchema,
    keys: &'a [&'t FieldSpec],
    columns: &'a [&'t FieldSpec],
    directives: &'a [UpdateDirective<'t>],
    returning: Option<&'a [&'t FieldSpec]>,
    suppress_redundant: bool,
}

impl UpsertTarget<'_, '_> {
    fn alias(&self) -> String {
        self.dialect.quote_identifier(&self.table.name)
    }

    /// `INSERT INTO t AS "t" (cols)`
    fn insert_head(&self) -> String {
        format!(
            "INSERT INTO {} AS {} ({})",
            self.dialect.quote_table(self.table),
            self.alias(),
            clause::column_list(self.dialect, self.columns)
        )
    }

    /// `ON CONFLICT (keys) DO ... [RETURNING ...]`
    fn conflict_tail(&self) -> Result<String> {
        let alias = self.alias();
        let mut sql = format!(
            "ON CONFLICT ({}) ",
            clause::column_list(self.dialect, self.keys)
        );

        if self.directives.is_empty() {
            sql.push_str("DO NOTHING");
        } else {
            let scope = ExprScope::conflict(&alias, "EXCLUDED");
            let values =
                clause::assignment_values(self.dialect, self.table, self.directives, &scope)?;
            sql.push_str("DO UPDATE SET ");
            sql.push_str(&clause::set_clause(self.dialect, self.directives, &values));
            if self.suppress_redundant {
                sql.push_str(" WHERE ");
                sql.push_str(&clause::redundant_guard(
                    self.dialect,
                    &alias,
                    self.directives,
                    &values,
                ));
            }
        }

        if let Some(fields) = self.returning {
            let mut items = clause::returning_list(self.dialect, &alias, fields);
            items.push(clause::status_marker(self.dialect, &alias));
            sql.push_str(" RETURNING ");
            sql.push_str(&items.join(", "));
        }
        Ok(sql)
    }

    fn statement(&self, rows: Vec<Vec<ValueSlot>>) -> Result<Statement> {
        let values = materialize::materialize(self.dialect, self.columns, rows);
        let sql = format!(
            "{} {} {}",
            self.insert_head(),
            values.values_clause(),
            self.conflict_tail()?
        );
        tracing::debug!(sql_len = sql.len(), params = values.params.len(), "built upsert");
        Ok(Statement::new(sql, values.params))
    }

    /// Upsert inside a CTE, unioned with the pre-statement rows matching
    /// the input so skipped updates are reported as untouched.
    fn untouched_statement(&self, rows: Vec<Vec<ValueSlot>>, pk: &FieldSpec) -> Result<Statement> {
        if rows.iter().flatten().any(ValueSlot::is_default) {
            return Err(BulkError::Configuration(
                "returning untouched rows requires explicit values; \
                 database defaults cannot appear in a CTE input list"
                    .to_string(),
            ));
        }

        let d = self.dialect;
        let mut values = materialize::materialize(d, self.columns, rows);
        for (idx, row) in values.rows.iter_mut().enumerate() {
            row.insert(0, idx.to_string());
        }

        let returning = self.returning.unwrap_or_default();
        let status = d.quote_identifier(STATUS_COLUMN);
        let column_list = clause::column_list(d, self.columns);
        let aliases = returning
            .iter()
            .map(|f| d.quote_identifier(&f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let existing = clause::returning_list(d, "\"c\"", returning).join(", ");
        let pk_alias = d.quote_identifier(&pk.name);

        let sql = format!(
            "WITH {input}({row_index}, {column_list}) AS ({values}), \
             ins AS ({insert_head} SELECT {column_list} FROM {input} ORDER BY {row_index} {tail}) \
             SELECT DISTINCT ON ({pk_alias}) * FROM (\
             SELECT {status}, {aliases} FROM ins \
             UNION ALL \
             SELECT 'n' AS {status}, {existing} FROM {input} JOIN {table} AS \"c\" USING ({keys})\
             ) AS results \
             ORDER BY results.{pk_alias}, CASE WHEN results.{status} = 'n' THEN 1 ELSE 0 END",
            input = INPUT_ROWS,
            row_index = d.quote_identifier(ROW_INDEX),
            values = values.values_clause(),
            insert_head = self.insert_head(),
            tail = self.conflict_tail()?,
            table = d.quote_table(self.table),
            keys = clause::column_list(d, self.keys),
        );
        tracing::debug!(sql_len = sql.len(), params = values.params.len(), "built upsert returning untouched");
        Ok(Statement::new(sql, values.params))
    }
}

#[cfg(test)]
mod tests;
