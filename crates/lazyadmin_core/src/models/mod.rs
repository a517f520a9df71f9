//! Data models for the LazyAdmin core.
//!
//! This module contains all core data structures:
//! - `connection` - ConnectionDescriptor, TunnelDescriptor, SslMode, HostKeyPolicy
//! - `value` - Value, Record
//! - `query` - TabularResult, ResultColumn, WriteOutcome
//! - `schema` - TableInfo, ColumnInfo, SchemaCache
//! - `record` - form input to record helpers

pub mod connection;
pub mod query;
pub mod record;
pub mod schema;
pub mod value;

pub use connection::{ConnectionDescriptor, HostKeyPolicy, SshAuth, SslMode, TunnelDescriptor};
pub use query::{ResultColumn, TabularResult, WriteOutcome, MAX_RESULT_ROWS};
pub use record::{changed_fields, insert_record};
pub use schema::{primary_key_of, ColumnInfo, SchemaCache, TableInfo};
pub use value::{Record, Value};
