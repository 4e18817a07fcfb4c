//! Transactions over a [`PostgresConnection`](crate::PostgresConnection)

use crate::connection::{format_postgres_error, run_copy, run_execute, run_query};
use crate::runtime::postgres_runtime;
use async_trait::async_trait;
use pgbulk_core::{
    BulkConnection, BulkError, CopyStatement, PostgresDialect, Result, Row, SqlDialect, Value,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::Client;

/// PostgreSQL transaction wrapper
///
/// Holds the connection's client lock for its whole lifetime, so bulk
/// operations run through it execute in order and nothing else can
/// interleave. Dropping it without `commit` or `rollback` rolls back.
pub struct PostgresTransaction {
    client: Option<OwnedMutexGuard<Client>>,
}

impl PostgresTransaction {
    pub(crate) async fn begin(client: Arc<Mutex<Client>>) -> Result<Self> {
        tracing::debug!("beginning PostgreSQL transaction");
        let client = client.lock_owned().await;
        client.batch_execute("BEGIN").await.map_err(|e| {
            BulkError::Query(format!(
                "Failed to begin transaction: {}",
                format_postgres_error(&e)
            ))
        })?;
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| BulkError::Other("transaction already finished".into()))
    }

    pub async fn commit(mut self) -> Result<()> {
        tracing::debug!("committing PostgreSQL transaction");
        self.finish("COMMIT").await?;
        tracing::debug!("PostgreSQL transaction committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        tracing::debug!("rolling back PostgreSQL transaction");
        self.finish("ROLLBACK").await?;
        tracing::debug!("PostgreSQL transaction rolled back");
        Ok(())
    }

    async fn finish(&mut self, command: &str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| BulkError::Other("transaction already finished".into()))?;
        client.batch_execute(command).await.map_err(|e| {
            BulkError::Query(format!(
                "Failed to {} transaction: {}",
                command.to_lowercase(),
                format_postgres_error(&e)
            ))
        })
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        tracing::warn!("PostgreSQL transaction dropped without commit or rollback, rolling back");
        // The lock moves into the task so nobody sees the open transaction
        postgres_runtime().spawn(async move {
            if let Err(e) = client.batch_execute("ROLLBACK").await {
                tracing::error!(error = %e, "Failed to roll back dropped transaction");
            }
        });
    }
}

#[async_trait]
impl BulkConnection for PostgresTransaction {
    fn dialect(&self) -> &dyn SqlDialect {
        &PostgresDialect
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query in transaction");
        run_query(self.client()?, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing statement in transaction");
        run_execute(self.client()?, sql, params).await
    }

    async fn copy_in(&self, statement: &CopyStatement, rows: Vec<Vec<Value>>) -> Result<u64> {
        tracing::debug!(sql = %statement.sql, "copying in transaction");
        run_copy(self.client()?, statement, rows).await
    }
}
