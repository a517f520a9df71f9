//! Schema introspection models.
//!
//! Uniform table and column metadata produced by the catalog queries of every
//! dialect.

use crate::error::{LazyAdminError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default schema namespace for PostgreSQL column lookups.
pub const DEFAULT_SCHEMA: &str = "public";

/// A user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Schema (namespace) name; empty for SQLite.
    pub schema: String,
}

impl TableInfo {
    /// Create table info.
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self { name: name.into(), schema: schema.into() }
    }

    /// Name qualified by schema when one is set.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name, exactly as the catalog reports it.
    pub name: String,
    /// Declared type in the dialect's own spelling.
    pub data_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Whether this column is part of the primary key.
    pub primary_key: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
}

impl ColumnInfo {
    /// Whether the column has a default value.
    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }

    /// Whether an INSERT must supply this column.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default()
    }
}

/// First primary-key column, or [`LazyAdminError::NoPrimaryKey`].
pub fn primary_key_of(table: &str, columns: &[ColumnInfo]) -> Result<String> {
    columns
        .iter()
        .find(|c| c.primary_key)
        .map(|c| c.name.clone())
        .ok_or_else(|| LazyAdminError::no_primary_key(table))
}

/// Default schema cache time-to-live (5 minutes).
const DEFAULT_SCHEMA_CACHE_TTL_SECS: u64 = 300;

/// Cached catalog metadata for one connection.
///
/// Entries expire after the TTL. Callers drop the cache when
/// [`is_for`](Self::is_for) no longer matches the live connection.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    connection_id: Uuid,
    tables: Vec<TableInfo>,
    columns: HashMap<(String, String), Vec<ColumnInfo>>,
    loaded_at: Instant,
    ttl: Duration,
}

impl SchemaCache {
    /// Create a cache with the default TTL.
    pub fn new(connection_id: Uuid, tables: Vec<TableInfo>) -> Self {
        Self::with_ttl(connection_id, tables, Duration::from_secs(DEFAULT_SCHEMA_CACHE_TTL_SECS))
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(connection_id: Uuid, tables: Vec<TableInfo>, ttl: Duration) -> Self {
        Self { connection_id, tables, columns: HashMap::new(), loaded_at: Instant::now(), ttl }
    }

    /// Connection this cache belongs to.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Whether the cache was built for `connection_id`.
    pub fn is_for(&self, connection_id: Uuid) -> bool {
        self.connection_id == connection_id
    }

    /// Cached tables.
    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    /// Cached columns of `schema.table`, if loaded.
    pub fn columns(&self, schema: &str, table: &str) -> Option<&[ColumnInfo]> {
        self.columns.get(&(schema.to_string(), table.to_string())).map(Vec::as_slice)
    }

    /// Store the columns of `schema.table`.
    pub fn insert_columns(&mut self, schema: &str, table: &str, columns: Vec<ColumnInfo>) {
        self.columns.insert((schema.to_string(), table.to_string()), columns);
    }

    /// Check if the cache has expired.
    pub fn is_expired(&self) -> bool {
        self.loaded_at.elapsed() > self.ttl
    }

    /// Check if the cache is still valid.
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    /// Replace the table list and drop all cached columns.
    pub fn refresh(&mut self, tables: Vec<TableInfo>) {
        self.tables = tables;
        self.columns.clear();
        self.loaded_at = Instant::now();
    }

    /// Drop everything and mark the cache expired.
    pub fn invalidate(&mut self) {
        self.tables.clear();
        self.columns.clear();
        self.ttl = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, pk: bool, nullable: bool, default: Option<&str>) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: "TEXT".to_string(),
            nullable,
            primary_key: pk,
            default_value: default.map(String::from),
        }
    }

    #[test]
    fn test_primary_key_of() {
        let cols = vec![column("email", false, false, None), column("id", true, false, None)];
        assert_eq!(primary_key_of("users", &cols).unwrap(), "id");

        let err = primary_key_of("logs", &[column("line", false, true, None)]).unwrap_err();
        assert!(err.is_no_primary_key());
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_required_columns() {
        assert!(column("email", false, false, None).is_required());
        assert!(!column("bio", false, true, None).is_required());
        assert!(!column("created", false, false, Some("CURRENT_TIMESTAMP")).is_required());
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(TableInfo::new("users", "").qualified_name(), "users");
        assert_eq!(TableInfo::new("users", "public").qualified_name(), "public.users");
    }

    #[test]
    fn test_schema_cache_lifecycle() {
        let id = Uuid::new_v4();
        let mut cache = SchemaCache::new(id, vec![TableInfo::new("users", "")]);
        assert!(cache.is_for(id));
        assert!(!cache.is_for(Uuid::new_v4()));
        assert!(cache.is_valid());

        cache.insert_columns("", "users", vec![column("id", true, false, None)]);
        assert_eq!(cache.columns("", "users").map(|c| c.len()), Some(1));

        cache.refresh(vec![TableInfo::new("orders", "")]);
        assert!(cache.columns("", "users").is_none());
        assert_eq!(cache.tables()[0].name, "orders");

        cache.invalidate();
        assert!(cache.tables().is_empty());
        assert!(cache.is_expired() || cache.ttl.is_zero());
    }

    #[test]
    fn test_schema_cache_ttl() {
        let cache = SchemaCache::with_ttl(Uuid::new_v4(), vec![], Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.is_expired());
    }
}
