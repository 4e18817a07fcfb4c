//! pgbulk core - statement planning and result reconstruction for bulk writes
//!
//! Turns a batch of records plus a table description into one multi-row
//! statement and turns the returned rows back into status-tagged results.
//! Three write shapes are supported:
//!
//! - `upsert` - `INSERT ... ON CONFLICT ... DO UPDATE | DO NOTHING`
//! - `update` - `UPDATE ... FROM (VALUES ...)` keyed by the primary key
//! - `copy` - streaming `COPY ... FROM STDIN`, text or binary
//!
//! The operations are written against [`BulkConnection`]; backends provide
//! the connection and a [`SqlDialect`].

mod clause;
mod coerce;
mod connection;
mod copy;
mod dialect;
mod error;
mod expr;
mod field;
mod materialize;
mod ops;
mod options;
mod record;
mod result;
mod sort;
mod statement;
mod types;
mod update;
mod upsert;

pub use clause::UpdateDirective;
pub use coerce::*;
pub use connection::*;
pub use copy::*;
pub use dialect::*;
pub use error::*;
pub use expr::*;
pub use field::*;
pub use materialize::*;
pub use ops::*;
pub use options::*;
pub use record::*;
pub use result::*;
pub use sort::*;
pub use statement::*;
pub use types::*;
pub use update::*;
pub use upsert::*;
