//! Query execution models.

use crate::error::{LazyAdminError, Result};
use crate::models::value::Value;
use serde::{Deserialize, Serialize};

/// Maximum number of rows materialized from a single query.
pub const MAX_RESULT_ROWS: usize = 10_000;

/// Minimum display width of a result column.
pub const MIN_COLUMN_WIDTH: usize = 10;

/// Default row limit for browse queries.
pub const DEFAULT_BROWSE_LIMIT: i64 = 100;

/// Column header of a tabular result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    /// Column name as reported by the driver.
    pub name: String,
    /// Display width hint: the name's length, at least [`MIN_COLUMN_WIDTH`].
    pub width: usize,
}

impl ResultColumn {
    /// Create a column with its width hint.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let width = name.chars().count().max(MIN_COLUMN_WIDTH);
        Self { name, width }
    }
}

/// Materialized query result ready for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    /// Ordered columns.
    pub columns: Vec<ResultColumn>,
    /// Ordered rows; every row has one display string per column.
    pub rows: Vec<Vec<String>>,
    /// Whether rows beyond [`MAX_RESULT_ROWS`] were dropped.
    pub truncated: bool,
}

impl TabularResult {
    /// Build a result from column names and decoded rows.
    ///
    /// Rows past [`MAX_RESULT_ROWS`] are dropped and `truncated` is set.
    pub fn from_values<I>(column_names: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let columns: Vec<ResultColumn> = column_names.into_iter().map(ResultColumn::new).collect();
        let mut out = Vec::new();
        let mut truncated = false;
        for row in rows {
            if out.len() == MAX_RESULT_ROWS {
                truncated = true;
                break;
            }
            out.push(row.iter().map(Value::to_display).collect());
        }
        Self { columns, rows: out, truncated }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Outcome of an UPDATE or DELETE keyed by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// The statement changed at least one row.
    Applied {
        /// Rows reported by the driver.
        rows_affected: u64,
    },
    /// The statement succeeded but matched nothing.
    NoRowsMatched,
}

impl WriteOutcome {
    /// Classify a driver-reported affected-row count.
    pub fn from_rows_affected(rows_affected: u64) -> Self {
        if rows_affected == 0 {
            Self::NoRowsMatched
        } else {
            Self::Applied { rows_affected }
        }
    }

    /// Whether any row was changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Rows changed (0 for `NoRowsMatched`).
    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::Applied { rows_affected } => *rows_affected,
            Self::NoRowsMatched => 0,
        }
    }

    /// Treat `NoRowsMatched` as an error.
    pub fn into_result(self) -> Result<u64> {
        match self {
            Self::Applied { rows_affected } => Ok(rows_affected),
            Self::NoRowsMatched => {
                Err(LazyAdminError::no_rows_affected("no rows affected (record may not exist)"))
            }
        }
    }
}
