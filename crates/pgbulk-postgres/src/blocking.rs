//! Blocking forms of the bulk operations
//!
//! Each function drives its async counterpart to completion on the
//! dedicated PostgreSQL runtime. Call these from plain threads only; inside
//! an async context use [`pgbulk_core::upsert`] and friends directly.

use crate::config::ConnectionConfig;
use crate::connection::PostgresConnection;
use crate::runtime::block_on;
use pgbulk_core::{
    BulkConnection, CopyOptions, Record, Result, TableSchema, UpdateOptions, UpdateSpec,
    UpsertOptions, UpsertResult,
};

pub fn connect(config: &ConnectionConfig) -> Result<PostgresConnection> {
    block_on(PostgresConnection::connect(config))
}

/// See [`pgbulk_core::upsert`]
pub fn upsert<C>(
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
    block_on(pgbulk_core::upsert(
        conn,
        table,
        records,
        unique_fields,
        update,
        options,
    ))
}

/// See [`pgbulk_core::update`]
pub fn update<C>(
    conn: &C,
    table: &TableSchema,
    records: Vec<Record>,
    update: &UpdateSpec,
    options: &UpdateOptions,
) -> Result<Option<UpsertResult>>
where
    C: BulkConnection + ?Sized,
{
    block_on(pgbulk_core::update(conn, table, records, update, options))
}

/// See [`pgbulk_core::copy`]
pub fn copy<C>(
    conn: &C,
    table: &TableSchema,
    records: Vec<Record>,
    fields: &[&str],
    options: &CopyOptions,
) -> Result<u64>
where
    C: BulkConnection + ?Sized,
{
    block_on(pgbulk_core::copy(conn, table, records, fields, options))
}
