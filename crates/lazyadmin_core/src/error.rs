//! Error types for the LazyAdmin core.
//!
//! Every failure is classified into one of the [`ErrorKind`] buckets so that
//! calling UI code can tell a dead server from a statement that simply matched
//! nothing.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = LazyAdminError> = std::result::Result<T, E>;

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or incomplete descriptor; raised before any I/O.
    Configuration,
    /// Dial, authentication or liveness failure (tunnel or database).
    Connectivity,
    /// Driver-reported execution failure.
    Statement,
    /// The operation succeeded but had nothing to act on.
    ZeroEffect,
    /// Fetch by primary key found no row.
    NotFound,
    /// Unexpected internal failure.
    Internal,
}

/// Main error type for the LazyAdmin core.
#[derive(Debug, Error)]
pub enum LazyAdminError {
    /// Invalid configuration or descriptor.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// Caller-supplied data failed validation (empty insert, blank required field).
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Database connection failed or was lost.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// SSH tunnel error.
    #[error("SSH error: {message}")]
    Ssh {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution error reported by the driver.
    #[error("{message}")]
    Query {
        /// Driver error message.
        message: String,
        /// Additional detail from the server.
        detail: Option<String>,
        /// Server hint.
        hint: Option<String>,
        /// Position in the statement (1-indexed).
        position: Option<usize>,
        /// Engine error code (SQLSTATE or extended result code).
        code: Option<String>,
    },

    /// An UPDATE or DELETE matched no rows.
    #[error("No rows affected: {message}")]
    NoRowsAffected {
        /// Human-readable error message.
        message: String,
    },

    /// The table has no primary-key column.
    #[error("No primary key found for table {table:?}")]
    NoPrimaryKey {
        /// Table that was inspected.
        table: String,
    },

    /// Fetch by primary key returned no row.
    #[error("Record not found in {table:?} where {column} = {value}")]
    RecordNotFound {
        /// Table that was queried.
        table: String,
        /// Primary-key column.
        column: String,
        /// Rendered primary-key value.
        value: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LazyAdminError {
    // ========== Constructors ==========

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), hint: None }
    }

    /// Create a new config error with a hint.
    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config { message: message.into(), hint: Some(hint.into()) }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), hint: None, source: None }
    }

    /// Create a new connection error with a hint.
    pub fn connection_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), hint: Some(hint.into()), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), hint: None, source: Some(Box::new(source)) }
    }

    /// Create a new authentication error with custom hint.
    pub fn authentication_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Authentication { message: message.into(), hint: Some(hint.into()) }
    }

    /// Create a new SSH error.
    pub fn ssh(message: impl Into<String>) -> Self {
        Self::Ssh { message: message.into(), hint: None, source: None }
    }

    /// Create a new SSH error with a hint.
    pub fn ssh_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Ssh { message: message.into(), hint: Some(hint.into()), source: None }
    }

    /// Create a new query error with only a message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            detail: None,
            hint: None,
            position: None,
            code: None,
        }
    }

    /// Create a no-rows-affected error.
    pub fn no_rows_affected(message: impl Into<String>) -> Self {
        Self::NoRowsAffected { message: message.into() }
    }

    /// Create a no-primary-key error.
    pub fn no_primary_key(table: impl Into<String>) -> Self {
        Self::NoPrimaryKey { table: table.into() }
    }

    /// Create a record-not-found error.
    pub fn record_not_found(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::RecordNotFound { table: table.into(), column: column.into(), value: value.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Validation { .. } => ErrorKind::Configuration,
            Self::Connection { .. } | Self::Authentication { .. } | Self::Ssh { .. } => {
                ErrorKind::Connectivity
            }
            Self::Query { .. } => ErrorKind::Statement,
            Self::NoRowsAffected { .. } | Self::NoPrimaryKey { .. } => ErrorKind::ZeroEffect,
            Self::RecordNotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error means the table has no primary key.
    pub fn is_no_primary_key(&self) -> bool {
        matches!(self, Self::NoPrimaryKey { .. })
    }

    /// Check if this error means a fetch found no row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }

    /// Check if this error represents a lost or failed connection.
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::Validation { .. } => "Validation",
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Ssh { .. } => "SSH",
            Self::Query { .. } => "Query",
            Self::NoRowsAffected { .. } => "No Rows",
            Self::NoPrimaryKey { .. } => "Primary Key",
            Self::RecordNotFound { .. } => "Not Found",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { hint, .. } => hint.as_deref(),
            Self::Validation { .. } => None,
            Self::Connection { hint, .. } => {
                hint.as_deref().or(Some("Check that the database server is running"))
            }
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::Ssh { hint, .. } => {
                hint.as_deref().or(Some("Check the SSH host and credentials"))
            }
            Self::Query { hint, .. } => hint.as_deref(),
            Self::NoRowsAffected { .. } => Some("The row may have been changed or removed"),
            Self::NoPrimaryKey { .. } => Some("Editing and deleting need a primary key"),
            Self::RecordNotFound { .. } => Some("Refresh the table to reload current rows"),
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get the engine error code (if applicable).
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for a "details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to LazyAdminError.
impl From<tokio_postgres::Error> for LazyAdminError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code_str = db_err.code().code();

            return match code_str {
                _ if code_str.starts_with("28") => LazyAdminError::Authentication {
                    message,
                    hint: Some("Check the database username and password".to_string()),
                },
                _ if code_str.starts_with("08") => LazyAdminError::Connection {
                    message,
                    hint: None,
                    source: Some(Box::new(err)),
                },
                _ => LazyAdminError::Query {
                    message,
                    detail,
                    hint,
                    position,
                    code: Some(code_str.to_string()),
                },
            };
        }

        if err.is_closed() {
            return LazyAdminError::Connection {
                message: "Connection closed".to_string(),
                hint: Some("Reconnect to the database".to_string()),
                source: Some(Box::new(err)),
            };
        }

        LazyAdminError::Connection {
            message: err.to_string(),
            hint: None,
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from deadpool_postgres::PoolError to LazyAdminError.
impl From<deadpool_postgres::PoolError> for LazyAdminError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => LazyAdminError::from(e),
            other => LazyAdminError::Connection {
                message: format!("Failed to acquire connection: {other}"),
                hint: Some("The connection may have been closed. Try reconnecting.".to_string()),
                source: None,
            },
        }
    }
}

/// Convert from rusqlite::Error to LazyAdminError.
impl From<rusqlite::Error> for LazyAdminError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi_err, msg) => {
                let message = msg.clone().unwrap_or_else(|| ffi_err.to_string());
                match ffi_err.code {
                    rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::PermissionDenied => LazyAdminError::Connection {
                        message,
                        hint: Some("Check the database file path and permissions".to_string()),
                        source: Some(Box::new(err)),
                    },
                    _ => LazyAdminError::Query {
                        message,
                        detail: None,
                        hint: None,
                        position: None,
                        code: Some(ffi_err.extended_code.to_string()),
                    },
                }
            }
            _ => LazyAdminError::query(err.to_string()),
        }
    }
}

/// Convert from sqlx::Error to LazyAdminError.
impl From<sqlx::Error> for LazyAdminError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                let message = db_err.message().to_string();
                // 28000: access denied
                if code.as_deref() == Some("28000") {
                    return LazyAdminError::authentication_with_hint(
                        message,
                        "Check the database username and password",
                    );
                }
                LazyAdminError::Query { message, detail: None, hint: None, position: None, code }
            }
            sqlx::Error::Io(e) => LazyAdminError::connection_with_source("MySQL I/O error", e),
            sqlx::Error::Tls(e) => LazyAdminError::Connection {
                message: format!("MySQL TLS error: {e}"),
                hint: None,
                source: None,
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                LazyAdminError::connection_with_hint(err.to_string(), "Try reconnecting")
            }
            sqlx::Error::Protocol(message) => LazyAdminError::connection(message),
            other => LazyAdminError::query(other.to_string()),
        }
    }
}

/// Convert from russh::Error to LazyAdminError.
impl From<russh::Error> for LazyAdminError {
    fn from(err: russh::Error) -> Self {
        LazyAdminError::Ssh { message: err.to_string(), hint: None, source: Some(Box::new(err)) }
    }
}

/// Convert from russh_keys::Error to LazyAdminError.
impl From<russh_keys::Error> for LazyAdminError {
    fn from(err: russh_keys::Error) -> Self {
        LazyAdminError::Ssh {
            message: err.to_string(),
            hint: Some("Check the private key file and passphrase".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from std::io::Error to LazyAdminError.
impl From<std::io::Error> for LazyAdminError {
    fn from(err: std::io::Error) -> Self {
        LazyAdminError::Connection {
            message: err.to_string(),
            hint: None,
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from serde_json::Error to LazyAdminError.
impl From<serde_json::Error> for LazyAdminError {
    fn from(err: serde_json::Error) -> Self {
        LazyAdminError::Config {
            message: format!("Invalid configuration file: {err}"),
            hint: Some("Check the file is valid JSON".to_string()),
        }
    }
}
