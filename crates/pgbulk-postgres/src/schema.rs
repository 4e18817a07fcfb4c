//! Table introspection from the PostgreSQL catalogs

use crate::connection::format_postgres_error;
use pgbulk_core::{BulkError, FieldSpec, Result, TableSchema};
use tokio_postgres::Client;

const COLUMNS_QUERY: &str = r#"
    SELECT
        a.attname::text AS name,
        format_type(a.atttypid, a.atttypmod) AS sql_type,
        COALESCE(i.indisprimary, false) AS is_primary,
        (a.attidentity <> ''
            OR COALESCE(pg_get_expr(d.adbin, d.adrelid), '') LIKE 'nextval(%') AS auto_generated,
        a.attgenerated <> '' AS is_generated
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    LEFT JOIN pg_index i
        ON i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
    WHERE c.relname = $1
      AND n.nspname = COALESCE($2, current_schema())
      AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// Describe `table` from the catalogs.
///
/// Identity and serial columns come back auto-generated, generated columns
/// non-concrete. A single-column primary key is marked; composite keys are
/// left unmarked since `update` matches on one column only. Auto timestamps
/// cannot be discovered and have to be flagged by the caller through
/// [`TableSchema::field_mut`].
pub(crate) async fn introspect_table(
    client: &Client,
    schema: Option<&str>,
    table: &str,
) -> Result<TableSchema> {
    tracing::debug!(schema = ?schema, table, "introspecting table");

    let rows = client
        .query(COLUMNS_QUERY, &[&table, &schema])
        .await
        .map_err(|e| {
            BulkError::Query(format!(
                "Failed to introspect table {}: {}",
                table,
                format_postgres_error(&e)
            ))
        })?;

    if rows.is_empty() {
        return Err(BulkError::Configuration(format!(
            "table {} does not exist or has no columns",
            match schema {
                Some(schema) => format!("{}.{}", schema, table),
                None => table.to_string(),
            }
        )));
    }

    let decode = |e: tokio_postgres::Error| {
        BulkError::Query(format!("Failed to read catalog row: {}", e))
    };
    let primary_columns = rows
        .iter()
        .map(|row| row.try_get::<_, bool>("is_primary"))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(decode)?
        .into_iter()
        .filter(|p| *p)
        .count();

    let mut described = TableSchema::new(table);
    if let Some(schema) = schema {
        described = described.with_schema(schema);
    }
    for row in &rows {
        let name: String = row.try_get("name").map_err(decode)?;
        let sql_type: String = row.try_get("sql_type").map_err(decode)?;
        let mut field = FieldSpec::new(name, sql_type);
        if row.try_get::<_, bool>("is_primary").map_err(decode)? && primary_columns == 1 {
            field = field.primary_key();
        }
        if row.try_get::<_, bool>("auto_generated").map_err(decode)? {
            field = field.auto_generated();
        }
        if row.try_get::<_, bool>("is_generated").map_err(decode)? {
            field = field.non_concrete();
        }
        described = described.field(field);
    }

    if primary_columns > 1 {
        tracing::debug!(
            table,
            columns = primary_columns,
            "composite primary key left unmarked"
        );
    }
    Ok(described)
}
