//! PostgreSQL connection implementation

use crate::config::ConnectionConfig;
use crate::runtime::postgres_runtime;
use crate::schema;
use crate::tls;
use crate::transaction::PostgresTransaction;
use crate::value::{PgValue, postgres_to_value};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use pgbulk_core::{
    BulkConnection, BulkError, CopyStatement, PostgresDialect, Result, Row, SqlDialect,
    TableSchema, Value, encode_text_row,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};

/// Text copy data is flushed to the server in chunks of about this size
const COPY_CHUNK_BYTES: usize = 64 * 1024;

const COPY_TYPES_QUERY: &str =
    "SELECT t::regtype::oid FROM unnest($1::text[]) WITH ORDINALITY AS x(t, n) ORDER BY n";

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    if let Some(constraint) = db_error.constraint() {
        message.push_str(&format!(" (constraint: {})", constraint));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "21000" => format!(
            "a row was affected twice, the batch has duplicate conflict keys: {}",
            message
        ),
        "42P10" => format!(
            "no unique constraint matches the conflict fields: {}",
            message
        ),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        "57014" => format!("statement cancelled or timed out: {}", message),
        _ => format!("{} (code: {})", message, code.code()),
    }
}

fn query_error(context: &str, error: tokio_postgres::Error) -> BulkError {
    BulkError::Query(format!("{}: {}", context, format_postgres_error(&error)))
}

/// PostgreSQL connection wrapper
///
/// Statements are serialized through a mutex on the client. A transaction
/// holds that mutex until it is committed or rolled back.
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            ssl_mode = %config.ssl_mode,
            "connecting to PostgreSQL database"
        );

        let pg_config = config.to_pg_config();
        let runtime = postgres_runtime();
        let connector = tls::build_connector(config)?;

        // The connection future is driven on the dedicated runtime so the
        // client works from any executor.
        let client = match connector {
            Some(tls) => {
                let (client, connection) = runtime
                    .spawn(async move { pg_config.connect(tls).await })
                    .await
                    .map_err(|e| {
                        BulkError::Connection(format!("PostgreSQL connection task failed: {}", e))
                    })?
                    .map_err(|e| {
                        BulkError::Connection(format!(
                            "Failed to connect to PostgreSQL: {}",
                            format_postgres_error(&e)
                        ))
                    })?;
                runtime.spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::error!(error = %e, "PostgreSQL connection error");
                    }
                });
                client
            }
            None => {
                let (client, connection) = runtime
                    .spawn(async move { pg_config.connect(NoTls).await })
                    .await
                    .map_err(|e| {
                        BulkError::Connection(format!("PostgreSQL connection task failed: {}", e))
                    })?
                    .map_err(|e| {
                        BulkError::Connection(format!(
                            "Failed to connect to PostgreSQL: {}",
                            format_postgres_error(&e)
                        ))
                    })?;
                runtime.spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::error!(error = %e, "PostgreSQL connection error");
                    }
                });
                client
            }
        };

        tracing::info!(
            host = %config.host,
            database = %config.database,
            "PostgreSQL connection established"
        );
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Start a transaction. The connection is unavailable to other callers
    /// until the transaction is committed, rolled back or dropped.
    pub async fn begin(&self) -> Result<PostgresTransaction> {
        PostgresTransaction::begin(Arc::clone(&self.client)).await
    }

    /// Describe a table from the catalogs. `schema` defaults to the current
    /// schema.
    pub async fn table_schema(&self, schema: Option<&str>, table: &str) -> Result<TableSchema> {
        let client = self.client.lock().await;
        schema::introspect_table(&client, schema, table).await
    }

    /// Run one or more semicolon separated statements without parameters
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| query_error("Failed to execute batch", e))
    }

    pub async fn is_closed(&self) -> bool {
        self.client.lock().await.is_closed()
    }
}

#[async_trait]
impl BulkConnection for PostgresConnection {
    fn dialect(&self) -> &dyn SqlDialect {
        &PostgresDialect
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let client = self.client.lock().await;
        run_query(&client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let client = self.client.lock().await;
        run_execute(&client, sql, params).await
    }

    #[tracing::instrument(skip_all, fields(columns = statement.columns.len(), rows = rows.len()))]
    async fn copy_in(&self, statement: &CopyStatement, rows: Vec<Vec<Value>>) -> Result<u64> {
        let client = self.client.lock().await;
        run_copy(&client, statement, rows).await
    }
}

/// Convert parameters to the types the prepared statement expects
fn bind_params(values: &[Value], param_types: &[Type]) -> Vec<PgValue> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| match param_types.get(i) {
            Some(target_type) => PgValue::from_value_for_type(value, target_type),
            None => PgValue::from_value(value),
        })
        .collect()
}

fn param_refs(values: &[PgValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

pub(crate) async fn run_query(client: &Client, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let start_time = std::time::Instant::now();

    // Prepare first so we know the target column types for each parameter
    let statement = client
        .prepare(sql)
        .await
        .map_err(|e| query_error("Failed to prepare query", e))?;

    let pg_params = bind_params(params, statement.params());
    let pg_rows = client
        .query(&statement, &param_refs(&pg_params))
        .await
        .map_err(|e| query_error("Failed to execute query", e))?;

    let column_names: Vec<String> = statement
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();

    let mut rows = Vec::with_capacity(pg_rows.len());
    for pg_row in &pg_rows {
        let values = (0..column_names.len())
            .map(|idx| postgres_to_value(pg_row, idx))
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row::new(column_names.clone(), values));
    }

    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = start_time.elapsed().as_millis() as u64,
        "query executed"
    );
    Ok(rows)
}

pub(crate) async fn run_execute(client: &Client, sql: &str, params: &[Value]) -> Result<u64> {
    let statement = client
        .prepare(sql)
        .await
        .map_err(|e| query_error("Failed to prepare statement", e))?;

    let pg_params = bind_params(params, statement.params());
    let affected_rows = client
        .execute(&statement, &param_refs(&pg_params))
        .await
        .map_err(|e| query_error("Failed to execute statement", e))?;

    tracing::debug!(affected_rows, "statement executed");
    Ok(affected_rows)
}

pub(crate) async fn run_copy(
    client: &Client,
    statement: &CopyStatement,
    rows: Vec<Vec<Value>>,
) -> Result<u64> {
    if statement.binary {
        copy_binary(client, statement, rows).await
    } else {
        copy_text(client, statement, rows).await
    }
}

/// Look up the wire type of every copied column. Only built-in types can
/// be encoded in the binary format.
async fn resolve_copy_types(client: &Client, statement: &CopyStatement) -> Result<Vec<Type>> {
    let names: Vec<&str> = statement
        .columns
        .iter()
        .map(|c| c.wire_type.as_str())
        .collect();
    let rows = client
        .query(COPY_TYPES_QUERY, &[&names])
        .await
        .map_err(|e| query_error("Failed to resolve copy column types", e))?;

    rows.iter()
        .zip(&statement.columns)
        .map(|(row, column)| {
            let oid: u32 = row
                .try_get(0)
                .map_err(|e| query_error("Failed to read type oid", e))?;
            Type::from_oid(oid).ok_or_else(|| {
                BulkError::NotSupported(format!(
                    "binary copy cannot encode column '{}' of type '{}'; use the text format",
                    column.name, column.wire_type
                ))
            })
        })
        .collect()
}

async fn copy_binary(
    client: &Client,
    statement: &CopyStatement,
    rows: Vec<Vec<Value>>,
) -> Result<u64> {
    let types = resolve_copy_types(client, statement).await?;
    let sink = client
        .copy_in::<_, Bytes>(statement.sql.as_str())
        .await
        .map_err(|e| query_error("Failed to start copy", e))?;
    let writer = BinaryCopyInWriter::new(sink, &types);
    futures::pin_mut!(writer);

    for row in &rows {
        let values: Vec<PgValue> = row
            .iter()
            .zip(&types)
            .map(|(value, ty)| PgValue::from_value_for_type(value, ty))
            .collect();
        writer
            .as_mut()
            .write(&param_refs(&values))
            .await
            .map_err(|e| query_error("Failed to write copy row", e))?;
    }

    writer
        .as_mut()
        .finish()
        .await
        .map_err(|e| query_error("Failed to finish copy", e))
}

async fn copy_text(client: &Client, statement: &CopyStatement, rows: Vec<Vec<Value>>) -> Result<u64> {
    let sink = client
        .copy_in::<_, Bytes>(statement.sql.as_str())
        .await
        .map_err(|e| query_error("Failed to start copy", e))?;
    futures::pin_mut!(sink);

    let mut buffer = BytesMut::with_capacity(COPY_CHUNK_BYTES);
    for row in &rows {
        buffer.extend_from_slice(encode_text_row(row).as_bytes());
        if buffer.len() >= COPY_CHUNK_BYTES {
            sink.send(buffer.split().freeze())
                .await
                .map_err(|e| query_error("Failed to send copy data", e))?;
        }
    }
    if !buffer.is_empty() {
        sink.send(buffer.freeze())
            .await
            .map_err(|e| query_error("Failed to send copy data", e))?;
    }

    sink.as_mut()
        .finish()
        .await
        .map_err(|e| query_error("Failed to finish copy", e))
}
