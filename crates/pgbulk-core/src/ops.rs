//! The bulk write operations: upsert, update and copy

use crate::{
    BulkConnection, CopyOptions, Record, Result, TableSchema, UpdateOptions, UpdateSpec,
    UpsertOptions, UpsertResult, coerce, copy as copy_builder, result, update as update_builder,
    upsert as upsert_builder,
};
use chrono::Utc;

/// Insert `records`, updating rows that collide on `unique_fields`.
///
/// Returns `None` unless rows were requested through `options.returning`
/// or `options.return_untouched`. An empty batch runs no statement.
#[tracing::instrument(
    skip_all,
    fields(table = %table.display_name(), records = records.len())
)]
pub async fn upsert<C>(
    conn: &C,
    table: &TableSchema,
    records: Vec<Record>,
    unique_fields: &[&str],
    update: &UpdateSpec,
    options: &UpsertOptions,
) -> Result<Option<UpsertResult>>
where
    C: BulkConnection + ?Sized,
{
    let wants_rows = options.returning.is_requested() || options.return_untouched;
    let statement = upsert_builder::build_upsert(
        conn.dialect(),
        table,
        records,
        unique_fields,
        update,
        options,
        Utc::now(),
    )?;

    let Some(statement) = statement else {
        return Ok(wants_rows.then(UpsertResult::default));
    };

    if wants_rows {
        let rows = conn.query(&statement.sql, &statement.params).await?;
        let result = result::reconstruct(rows)?;
        tracing::debug!(
            returned = result.len(),
            created = result.created().count(),
            updated = result.updated().count(),
            "upsert complete"
        );
        Ok(Some(result))
    } else {
        let affected = conn.execute(&statement.sql, &statement.params).await?;
        tracing::debug!(affected, "upsert complete");
        Ok(None)
    }
}

/// Update existing rows, matched on the primary key, with the values in
/// `records`.
///
/// Every returned row has status `Updated`. An empty batch or an empty
/// update-field list runs no statement.
#[tracing::instrument(
    skip_all,
    fields(table = %table.display_name(), records = records.len())
)]
pub async fn update<C>(
    conn: &C,
    table: &TableSchema,
    records: Vec<Record>,
    update: &UpdateSpec,
    options: &UpdateOptions,
) -> Result<Option<UpsertResult>>
where
    C: BulkConnection + ?Sized,
{
    let wants_rows = options.returning.is_requested();
    let statement = update_builder::build_update(
        conn.dialect(),
        table,
        records,
        update,
        options,
        Utc::now(),
    )?;

    let Some(statement) = statement else {
        return Ok(wants_rows.then(UpsertResult::default));
    };

    if wants_rows {
        let rows = conn.query(&statement.sql, &statement.params).await?;
        let result = result::reconstruct(rows)?;
        tracing::debug!(returned = result.len(), "update complete");
        Ok(Some(result))
    } else {
        let affected = conn.execute(&statement.sql, &statement.params).await?;
        tracing::debug!(affected, "update complete");
        Ok(None)
    }
}

/// Stream `records` into the table with the bulk copy protocol.
///
/// `fields` names the copied fields; an empty list copies every concrete
/// field that is not auto-generated. Returns the number of rows copied.
#[tracing::instrument(
    skip_all,
    fields(table = %table.display_name(), records = records.len(), binary = options.binary)
)]
pub async fn copy<C>(
    conn: &C,
    table: &TableSchema,
    records: Vec<Record>,
    fields: &[&str],
    options: &CopyOptions,
) -> Result<u64>
where
    C: BulkConnection + ?Sized,
{
    let mut records = records;
    coerce::fill_auto_timestamps(table, &mut records, Utc::now());

    let Some((statement, rows)) =
        copy_builder::build_copy(conn.dialect(), table, &records, fields, options)?
    else {
        return Ok(0);
    };

    let started = std::time::Instant::now();
    let copied = conn.copy_in(&statement, rows).await?;
    tracing::debug!(
        copied,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "copy complete"
    );
    Ok(copied)
}
