//! Driver interface the bulk operations run against

use crate::{CopyStatement, Result, Row, SqlDialect, Value};
use async_trait::async_trait;

/// A database connection (or transaction) able to run generated statements.
#[async_trait]
pub trait BulkConnection: Send + Sync {
    /// SQL dialect used to build statements for this connection
    fn dialect(&self) -> &dyn SqlDialect;

    /// Execute a statement and collect every returned row.
    ///
    /// Column names of the returned rows are the names (or aliases) from
    /// the statement's select or RETURNING list.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement, returning the number of rows affected
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run a copy statement and stream `rows` to it, one at a time.
    /// Returns the number of rows copied.
    async fn copy_in(&self, statement: &CopyStatement, rows: Vec<Vec<Value>>) -> Result<u64>;
}
