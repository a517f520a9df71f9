//! Schema introspection service.
//!
//! Runs each dialect's catalog queries and normalizes the rows into
//! [`TableInfo`] and [`ColumnInfo`].

use crate::dialect::Dialect;
use crate::error::{LazyAdminError, Result};
use crate::models::schema::{primary_key_of, ColumnInfo, SchemaCache, TableInfo, DEFAULT_SCHEMA};
use crate::models::value::Value;
use crate::services::connection::Connection;

/// Schema introspection service.
pub struct SchemaService;

impl SchemaService {
    /// List user tables, ordered by schema then name.
    pub async fn list_tables(conn: &Connection) -> Result<Vec<TableInfo>> {
        let rows = conn.query(conn.dialect().list_tables_sql(), &[], None).await?;
        let tables: Vec<TableInfo> = rows
            .rows
            .iter()
            .map(|row| TableInfo::new(text_at(row, 0), text_at(row, 1)))
            .collect();
        tracing::debug!(dialect = %conn.dialect(), count = tables.len(), "Loaded tables");
        Ok(tables)
    }

    /// List the columns of `table` in catalog order.
    ///
    /// `schema` only applies to PostgreSQL and defaults to `public`.
    pub async fn list_columns(
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        let dialect = conn.dialect();
        let sql = dialect.list_columns_sql(table);
        let params = match dialect {
            Dialect::Sqlite => vec![],
            Dialect::Postgres => vec![
                Value::Text(table.to_string()),
                Value::Text(schema.unwrap_or(DEFAULT_SCHEMA).to_string()),
            ],
            Dialect::MySql => vec![Value::Text(table.to_string())],
        };

        let rows = conn.query(&sql, &params, None).await?;
        let columns = match dialect {
            Dialect::Sqlite => rows.rows.iter().map(|row| pragma_column(row)).collect(),
            Dialect::Postgres | Dialect::MySql => {
                rows.rows.iter().map(|row| catalog_column(row)).collect::<Result<Vec<_>>>()?
            }
        };
        Ok(columns)
    }

    /// Name of the first primary-key column of `table`.
    ///
    /// Returns [`LazyAdminError::NoPrimaryKey`] when the table has none.
    pub async fn get_primary_key(
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<String> {
        let columns = Self::list_columns(conn, table, schema).await?;
        primary_key_of(table, &columns)
    }

    /// Build a schema cache holding the current table list.
    pub async fn load_cache(conn: &Connection) -> Result<SchemaCache> {
        Ok(SchemaCache::new(conn.id(), Self::list_tables(conn).await?))
    }

    /// Columns of `table`, served from `cache` when possible.
    ///
    /// A cache built for another connection, or an expired one, is reloaded.
    pub async fn cached_columns(
        conn: &Connection,
        cache: &mut SchemaCache,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        if !cache.is_for(conn.id()) || cache.is_expired() {
            *cache = Self::load_cache(conn).await?;
        }
        let key_schema = match conn.dialect() {
            Dialect::Postgres => schema.unwrap_or(DEFAULT_SCHEMA),
            Dialect::Sqlite | Dialect::MySql => "",
        };
        if let Some(columns) = cache.columns(key_schema, table) {
            return Ok(columns.to_vec());
        }
        let columns = Self::list_columns(conn, table, schema).await?;
        cache.insert_columns(key_schema, table, columns.clone());
        Ok(columns)
    }
}

/// Parse a `PRAGMA table_info` row: cid, name, type, notnull, dflt_value, pk.
fn pragma_column(row: &[Value]) -> ColumnInfo {
    ColumnInfo {
        name: text_at(row, 1),
        data_type: text_at(row, 2),
        nullable: !flag_at(row, 3),
        // pk holds the 1-based position within the key, 0 when not part of it
        primary_key: flag_at(row, 5),
        default_value: opt_text_at(row, 4),
    }
}

/// Parse a server catalog row: name, data_type, nullable, is_pk, column_default.
fn catalog_column(row: &[Value]) -> Result<ColumnInfo> {
    if row.len() < 5 {
        return Err(LazyAdminError::internal(format!(
            "column catalog query returned {} fields, expected 5",
            row.len()
        )));
    }
    Ok(ColumnInfo {
        name: text_at(row, 0),
        data_type: text_at(row, 1),
        nullable: flag_at(row, 2),
        primary_key: flag_at(row, 3),
        default_value: opt_text_at(row, 4),
    })
}

fn text_at(row: &[Value], idx: usize) -> String {
    opt_text_at(row, idx).unwrap_or_default()
}

fn opt_text_at(row: &[Value], idx: usize) -> Option<String> {
    match row.get(idx) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.to_display()),
    }
}

fn flag_at(row: &[Value], idx: usize) -> bool {
    match row.get(idx) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Int(i)) => *i != 0,
        Some(Value::Text(s)) => {
            matches!(s.to_ascii_lowercase().as_str(), "yes" | "1" | "t" | "true")
        }
        _ => false,
    }
}
