//! Clause fragments shared by the upsert and update builders

use crate::{
    Expr, ExprScope, FieldSpec, Result, Returning, SqlDialect, TableSchema, UpdateSpec,
    result::STATUS_COLUMN, strip_type_qualifiers,
};

/// A resolved update directive: the field to set and, optionally, the
/// expression to set it to.
#[derive(Debug, Clone)]
pub struct UpdateDirective<'t> {
    pub field: &'t FieldSpec,
    pub expression: Option<Expr>,
}

/// Resolve the fields written when a row already exists.
///
/// Key fields, auto-generated fields, auto-timestamp-on-create fields,
/// non-concrete fields and `exclude`d fields are never updated, whether the
/// list was defaulted or given explicitly.
pub fn resolve_update_directives<'t>(
    table: &'t TableSchema,
    spec: &UpdateSpec,
    keys: &[&FieldSpec],
    exclude: &[String],
) -> Result<Vec<UpdateDirective<'t>>> {
    let excluded = table.resolve_all(exclude)?;
    let allowed = |field: &FieldSpec| {
        field.is_updatable()
            && !keys.iter().any(|k| k.name == field.name)
            && !excluded.iter().any(|e| e.name == field.name)
    };

    let mut directives: Vec<UpdateDirective<'t>> = Vec::new();
    match spec {
        UpdateSpec::All => {
            for field in table.concrete_fields().filter(|f| allowed(f)) {
                directives.push(UpdateDirective {
                    field,
                    expression: None,
                });
            }
        }
        UpdateSpec::Fields(fields) => {
            for update in fields {
                let field = table.resolve(&update.name)?;
                if let Some(expr) = &update.expression {
                    // Unknown names inside expressions fail here too
                    for name in expr.referenced_fields() {
                        table.resolve(name)?;
                    }
                }
                if !allowed(field) || directives.iter().any(|d| d.field.name == field.name) {
                    continue;
                }
                directives.push(UpdateDirective {
                    field,
                    expression: update.expression.clone(),
                });
            }
        }
    }
    Ok(directives)
}

/// Compiled right-hand side of each directive, in directive order
pub fn assignment_values(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    directives: &[UpdateDirective<'_>],
    scope: &ExprScope<'_>,
) -> Result<Vec<String>> {
    directives
        .iter()
        .map(|directive| match &directive.expression {
            Some(expr) => dialect.compile_expression(expr, table, scope),
            None => Ok(format!(
                "{}.{}",
                scope.proposed.unwrap_or_default(),
                dialect.quote_identifier(&directive.field.column)
            )),
        })
        .collect()
}

/// `"a" = <rhs>, "b" = <rhs>`
pub fn set_clause(
    dialect: &dyn SqlDialect,
    directives: &[UpdateDirective<'_>],
    values: &[String],
) -> String {
    directives
        .iter()
        .zip(values)
        .map(|(directive, value)| {
            format!("{} = {}", dialect.quote_identifier(&directive.field.column), value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Row-level no-op guard over exactly the updated columns:
/// `(existing.a, existing.b) IS DISTINCT FROM (<rhs a>, <rhs b>)`
///
/// `json` has no equality operator, so both sides of a json column are
/// compared as `jsonb`.
pub fn redundant_guard(
    dialect: &dyn SqlDialect,
    existing: &str,
    directives: &[UpdateDirective<'_>],
    values: &[String],
) -> String {
    let comparable = |field: &FieldSpec, sql: String| {
        match strip_type_qualifiers(&field.sql_type).as_str() {
            "json" => dialect.cast(&format!("({})", sql), "jsonb"),
            "json[]" => dialect.cast(&format!("({})", sql), "jsonb[]"),
            _ => sql,
        }
    };
    let current = directives
        .iter()
        .map(|d| {
            let column = format!("{}.{}", existing, dialect.quote_identifier(&d.field.column));
            comparable(d.field, column)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let proposed = directives
        .iter()
        .zip(values)
        .map(|(d, value)| comparable(d.field, value.clone()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("({}) IS DISTINCT FROM ({})", current, proposed)
}

/// Fields named by a returning option, in table order for `All`
pub fn resolve_returning<'t>(
    table: &'t TableSchema,
    returning: &Returning,
) -> Result<Vec<&'t FieldSpec>> {
    match returning {
        Returning::None => Ok(Vec::new()),
        Returning::All => Ok(table.concrete_fields().collect()),
        Returning::Fields(names) => table.resolve_all(names),
    }
}

/// `<prefix>."col" AS "name", ...`, columns aliased to logical field names
pub fn returning_list(
    dialect: &dyn SqlDialect,
    prefix: &str,
    fields: &[&FieldSpec],
) -> Vec<String> {
    fields
        .iter()
        .map(|f| {
            format!(
                "{}.{} AS {}",
                prefix,
                dialect.quote_identifier(&f.column),
                dialect.quote_identifier(&f.name)
            )
        })
        .collect()
}

/// Classifies a returned row as created or updated. A row written by the
/// insert has no deleting transaction recorded yet, one rewritten by the
/// conflict action does.
pub fn status_marker(dialect: &dyn SqlDialect, existing: &str) -> String {
    format!(
        "CASE WHEN {}.xmax = 0 THEN 'c' ELSE 'u' END AS {}",
        existing,
        dialect.quote_identifier(STATUS_COLUMN)
    )
}

/// Quoted column names joined with commas
pub fn column_list(dialect: &dyn SqlDialect, fields: &[&FieldSpec]) -> String {
    fields
        .iter()
        .map(|f| dialect.quote_identifier(&f.column))
        .collect::<Vec<_>>()
        .join(", ")
}
