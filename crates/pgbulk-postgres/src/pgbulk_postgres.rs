//! PostgreSQL backend for pgbulk
//!
//! Provides [`PostgresConnection`] and [`PostgresTransaction`], both usable
//! as a [`pgbulk_core::BulkConnection`], plus connection configuration and
//! blocking wrappers around the bulk operations.

pub mod blocking;
mod config;
mod connection;
mod runtime;
mod schema;
mod tls;
mod transaction;
mod value;

pub use config::*;
pub use connection::PostgresConnection;
pub use runtime::postgres_runtime;
pub use tls::TlsError;
pub use transaction::PostgresTransaction;

pub use pgbulk_core::{
    BulkError, CopyOptions, Expr, FieldSpec, FieldValue, Record, Result, Returning, RowStatus,
    TableSchema, UpdateField, UpdateOptions, UpdateSpec, UpsertOptions, UpsertResult, Value, copy,
    update, upsert,
};
