//! Statement building and CRUD execution.
//!
//! [`QueryBuilder`] produces SQL text plus bound parameters; identifiers are
//! always quoted for the dialect and values always go through placeholders.
//! [`CrudService`] runs those statements against a [`Connection`].

use crate::dialect::Dialect;
use crate::error::{LazyAdminError, Result};
use crate::models::query::{TabularResult, WriteOutcome, DEFAULT_BROWSE_LIMIT, MAX_RESULT_ROWS};
use crate::models::value::{Record, Value};
use crate::services::connection::Connection;
use std::time::Instant;

/// A SQL statement with its bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Parameters, one per placeholder.
    pub params: Vec<Value>,
}

/// Builds dialect-correct, parameterized statements.
pub struct QueryBuilder;

impl QueryBuilder {
    /// `SELECT * FROM <table> LIMIT <n>`. Limits of zero or below use 100.
    pub fn browse(dialect: Dialect, table: &str, limit: i64) -> String {
        let limit = if limit <= 0 { DEFAULT_BROWSE_LIMIT } else { limit };
        format!("SELECT * FROM {} LIMIT {limit}", dialect.quote_identifier(table))
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<placeholders>)`, columns sorted by name.
    pub fn insert(dialect: Dialect, table: &str, data: &Record) -> Result<Statement> {
        if data.is_empty() {
            return Err(LazyAdminError::validation("no data to insert"));
        }

        let keys = sorted_keys(data);
        let columns: Vec<String> = keys.iter().map(|k| dialect.quote_identifier(k)).collect();
        let placeholders: Vec<String> = (1..=keys.len()).map(|i| dialect.placeholder(i)).collect();

        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                dialect.quote_identifier(table),
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: keys.iter().map(|k| data[*k].clone()).collect(),
        })
    }

    /// `UPDATE <table> SET <col = placeholder, ...> WHERE <pk> = <placeholder>`.
    pub fn update(
        dialect: Dialect,
        table: &str,
        pk_column: &str,
        pk_value: &Value,
        data: &Record,
    ) -> Result<Statement> {
        if data.is_empty() {
            return Err(LazyAdminError::validation("no data to update"));
        }

        let keys = sorted_keys(data);
        let set_clauses: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                format!("{} = {}", dialect.quote_identifier(k), dialect.placeholder(i + 1))
            })
            .collect();

        let mut params: Vec<Value> = keys.iter().map(|k| data[*k].clone()).collect();
        params.push(pk_value.clone());

        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = {}",
                dialect.quote_identifier(table),
                set_clauses.join(", "),
                dialect.quote_identifier(pk_column),
                dialect.placeholder(keys.len() + 1)
            ),
            params,
        })
    }

    /// `DELETE FROM <table> WHERE <pk> = <placeholder>`.
    pub fn delete(dialect: Dialect, table: &str, pk_column: &str, pk_value: &Value) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = {}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(pk_column),
                dialect.placeholder(1)
            ),
            params: vec![pk_value.clone()],
        }
    }

    /// `SELECT * FROM <table> WHERE <pk> = <placeholder>`.
    pub fn select_by_pk(
        dialect: Dialect,
        table: &str,
        pk_column: &str,
        pk_value: &Value,
    ) -> Statement {
        Statement {
            sql: format!(
                "SELECT * FROM {} WHERE {} = {}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(pk_column),
                dialect.placeholder(1)
            ),
            params: vec![pk_value.clone()],
        }
    }
}

fn sorted_keys(data: &Record) -> Vec<&String> {
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    keys
}

/// Executes browse, ad hoc and CRUD statements.
pub struct CrudService;

impl CrudService {
    /// Browse the first `limit` rows of `table`.
    pub async fn browse(conn: &Connection, table: &str, limit: i64) -> Result<TabularResult> {
        Self::run_query(conn, &QueryBuilder::browse(conn.dialect(), table, limit)).await
    }

    /// Execute raw SQL verbatim and materialize the result.
    ///
    /// At most [`MAX_RESULT_ROWS`] rows are kept; `truncated` reports the rest.
    pub async fn run_query(conn: &Connection, sql: &str) -> Result<TabularResult> {
        let start = Instant::now();
        let decoded = conn.query(sql, &[], Some(MAX_RESULT_ROWS)).await?;
        let mut result = TabularResult::from_values(decoded.columns, decoded.rows);
        result.truncated |= decoded.truncated;

        tracing::debug!(
            connection_id = %conn.id(),
            row_count = result.row_count(),
            truncated = result.truncated,
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(result)
    }

    /// Insert one row; returns the affected-row count.
    pub async fn insert(conn: &Connection, table: &str, data: &Record) -> Result<u64> {
        let stmt = QueryBuilder::insert(conn.dialect(), table, data)?;
        conn.execute(&stmt.sql, &stmt.params).await
    }

    /// Update the row whose primary key equals `pk_value`.
    pub async fn update(
        conn: &Connection,
        table: &str,
        pk_column: &str,
        pk_value: &Value,
        data: &Record,
    ) -> Result<WriteOutcome> {
        let stmt = QueryBuilder::update(conn.dialect(), table, pk_column, pk_value, data)?;
        let affected = conn.execute(&stmt.sql, &stmt.params).await?;
        let outcome = WriteOutcome::from_rows_affected(affected);
        if !outcome.is_applied() {
            tracing::debug!(table, pk_column, "Update matched no rows");
        }
        Ok(outcome)
    }

    /// Delete the row whose primary key equals `pk_value`.
    pub async fn delete(
        conn: &Connection,
        table: &str,
        pk_column: &str,
        pk_value: &Value,
    ) -> Result<WriteOutcome> {
        let stmt = QueryBuilder::delete(conn.dialect(), table, pk_column, pk_value);
        let affected = conn.execute(&stmt.sql, &stmt.params).await?;
        let outcome = WriteOutcome::from_rows_affected(affected);
        if !outcome.is_applied() {
            tracing::debug!(table, pk_column, "Delete matched no rows");
        }
        Ok(outcome)
    }

    /// Fetch the row whose primary key equals `pk_value`.
    ///
    /// Returns [`LazyAdminError::RecordNotFound`] when no row matches.
    pub async fn get_by_primary_key(
        conn: &Connection,
        table: &str,
        pk_column: &str,
        pk_value: &Value,
    ) -> Result<Record> {
        let stmt = QueryBuilder::select_by_pk(conn.dialect(), table, pk_column, pk_value);
        let decoded = conn.query(&stmt.sql, &stmt.params, Some(1)).await?;
        let row = decoded.rows.into_iter().next().ok_or_else(|| {
            LazyAdminError::record_not_found(table, pk_column, pk_value.to_display())
        })?;
        Ok(decoded.columns.into_iter().zip(row).collect())
    }
}
