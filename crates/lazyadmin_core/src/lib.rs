//! Core of the LazyAdmin terminal database browser.
//!
//! This crate provides everything below the UI:
//!
//! - **dialect**: Per-engine identifier quoting, placeholders and catalog SQL
//! - **error**: Error taxonomy with user-facing hints
//! - **config**: JSON configuration file
//! - **models**: Connection descriptors, values, results and schema metadata
//! - **services**: SSH tunnels, connections, schema introspection and CRUD
//! - **logging**: Structured logging setup

pub mod config;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;


pub use config::{AppConfig, SavedView};
pub use dialect::{escape_literal, quote_identifier, Dialect};
pub use error::{ErrorKind, LazyAdminError, Result};
pub use models::{
    ColumnInfo, ConnectionDescriptor, HostKeyPolicy, Record, SchemaCache, SslMode, TableInfo,
    TabularResult, TunnelDescriptor, Value, WriteOutcome,
};
pub use services::{
    Connection, ConnectionManager, CrudService, QueryBuilder, SchemaService, SshTunnel,
};
