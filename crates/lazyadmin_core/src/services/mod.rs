//! Backend services for LazyAdmin.
//!
//! This module contains all service layer abstractions:
//! - `tunnel` - SSH local port forwarding
//! - `connection` - Driver selection, DSN construction and connection lifecycle
//! - `rows` - Driver row decoding into `Value`s
//! - `schema` - Table and column introspection
//! - `query` - SQL statement building and CRUD execution

pub mod connection;
pub mod query;
pub mod rows;
pub mod schema;
pub mod tunnel;

pub use connection::{postgres_dsn, Connection, ConnectionManager, ConnectionParams, MySqlDsn};
pub use query::{CrudService, QueryBuilder, Statement};
pub use rows::DecodedRows;
pub use schema::SchemaService;
pub use tunnel::{RemoteDialer, SshDialer, SshTunnel, TcpDialer, Tunnel, TunnelState};
