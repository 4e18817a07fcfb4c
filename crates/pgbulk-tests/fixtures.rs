//! Shared fixtures for the integration tests.
//!
//! Every test gets its own connection and creates its own table with a
//! unique name, so tests never observe each other's rows.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pgbulk_tests::fixtures::{TestTable, test_connection};
//!
//! let conn = test_connection().await?;
//! let table = TestTable::create(&conn, "items", "id bigserial PRIMARY KEY, name text").await?;
//! ```

use crate::test_containers::postgres_config;
use anyhow::{Context, Result};
use pgbulk_core::{BulkConnection, Row, TableSchema, Value};
use pgbulk_postgres::PostgresConnection;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring `RUST_LOG`, once per process
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Open a fresh connection to the test database
pub async fn test_connection() -> Result<PostgresConnection> {
    init_tracing();
    let config = postgres_config().await?;
    PostgresConnection::connect(&config)
        .await
        .context("failed to connect to the test database")
}

/// A table created for one test, described by catalog introspection
pub struct TestTable {
    pub name: String,
    pub schema: TableSchema,
}

impl TestTable {
    /// Create `<prefix>_<random>` with the given column definitions and
    /// describe it.
    pub async fn create(conn: &PostgresConnection, prefix: &str, columns: &str) -> Result<Self> {
        let name = format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8]);
        conn.batch_execute(&format!("CREATE TABLE \"{}\" ({})", name, columns))
            .await
            .with_context(|| format!("failed to create table {}", name))?;
        let schema = conn
            .table_schema(None, &name)
            .await
            .with_context(|| format!("failed to describe table {}", name))?;
        Ok(Self { name, schema })
    }

    /// Every row of the table ordered by `order_by`
    pub async fn rows(&self, conn: &PostgresConnection, order_by: &str) -> Result<Vec<Row>> {
        let sql = format!("SELECT * FROM \"{}\" ORDER BY {}", self.name, order_by);
        conn.query(&sql, &[]).await.context("failed to read table")
    }

    pub async fn count(&self, conn: &PostgresConnection) -> Result<i64> {
        let rows = conn
            .query(&format!("SELECT count(*) AS n FROM \"{}\"", self.name), &[])
            .await?;
        rows.first()
            .and_then(|row| row.get_by_name("n"))
            .and_then(Value::as_i64)
            .context("count returned no rows")
    }
}

/// Column `name` of every row
pub fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get_by_name(name).cloned().unwrap_or(Value::Null))
        .collect()
}
