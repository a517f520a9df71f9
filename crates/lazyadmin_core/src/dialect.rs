//! SQL dialects supported by LazyAdmin.
//!
//! A [`Dialect`] is chosen once when a descriptor is parsed and then carried on
//! the live connection. Everything that differs between engines (identifier
//! quoting, placeholders, default ports, catalog queries) hangs off it.

use crate::error::LazyAdminError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Embedded SQLite database file.
    #[serde(alias = "sqlite3")]
    Sqlite,
    /// PostgreSQL server.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL or MariaDB server.
    #[serde(rename = "mysql")]
    MySql,
}

impl Dialect {
    /// All supported dialects.
    pub const ALL: [Dialect; 3] = [Dialect::Sqlite, Dialect::Postgres, Dialect::MySql];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Standard port, or `None` for the embedded dialect.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
        }
    }

    /// Character used to quote identifiers.
    pub fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::Sqlite | Self::Postgres => '"',
        }
    }

    /// Quote a table or column name.
    ///
    /// The result is always wrapped in the dialect's quote character and every
    /// embedded quote character is doubled, so the name can never escape the
    /// identifier context.
    pub fn quote_identifier(&self, name: &str) -> String {
        let quote = self.quote_char();
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(quote);
        for ch in name.chars() {
            if ch == quote {
                quoted.push(quote);
            }
            quoted.push(ch);
        }
        quoted.push(quote);
        quoted
    }

    /// Placeholder for the `position`-th bound parameter (1-based).
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::Postgres => format!("${position}"),
            Self::Sqlite | Self::MySql => "?".to_string(),
        }
    }

    /// Catalog query listing user tables as `(name, schema)` rows.
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            Self::Sqlite => {
                "SELECT name, '' AS schema FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name"
            }
            Self::Postgres => {
                r#"
                SELECT table_name::text AS name, table_schema::text AS schema
                FROM information_schema.tables
                WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
                ORDER BY table_schema, table_name
                "#
            }
            Self::MySql => {
                r#"
                SELECT CAST(table_name AS CHAR) AS name, CAST(table_schema AS CHAR) AS `schema`
                FROM information_schema.tables
                WHERE table_schema = DATABASE()
                ORDER BY table_name
                "#
            }
        }
    }

    /// Catalog query listing the columns of one table.
    ///
    /// SQLite cannot bind parameters in `PRAGMA`, so the table name is
    /// embedded as an escaped string literal. The server dialects bind the
    /// table (and for PostgreSQL the schema) as parameters.
    pub fn list_columns_sql(&self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("PRAGMA table_info('{}')", escape_literal(table)),
            Self::Postgres => r#"
                SELECT
                    c.column_name::text AS name,
                    c.data_type::text AS data_type,
                    c.is_nullable = 'YES' AS nullable,
                    EXISTS (
                        SELECT 1
                        FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage kcu
                            ON tc.constraint_name = kcu.constraint_name
                            AND tc.table_schema = kcu.table_schema
                            AND tc.table_name = kcu.table_name
                        WHERE tc.constraint_type = 'PRIMARY KEY'
                            AND tc.table_schema = c.table_schema
                            AND tc.table_name = c.table_name
                            AND kcu.column_name = c.column_name
                    ) AS is_pk,
                    c.column_default::text AS column_default
                FROM information_schema.columns c
                WHERE c.table_name = $1 AND c.table_schema = $2
                ORDER BY c.ordinal_position
                "#
            .to_string(),
            Self::MySql => r#"
                SELECT
                    CAST(COLUMN_NAME AS CHAR) AS name,
                    CAST(COLUMN_TYPE AS CHAR) AS data_type,
                    CAST(IS_NULLABLE = 'YES' AS SIGNED) AS nullable,
                    CAST(COLUMN_KEY = 'PRI' AS SIGNED) AS is_pk,
                    CAST(COLUMN_DEFAULT AS CHAR) AS column_default
                FROM information_schema.columns
                WHERE table_schema = DATABASE() AND table_name = ?
                ORDER BY ordinal_position
                "#
            .to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = LazyAdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "" => Err(LazyAdminError::config_with_hint(
                "Database driver is required",
                "Set driver to one of: sqlite, postgres, mysql",
            )),
            other => Err(LazyAdminError::config_with_hint(
                format!("Unsupported database driver: {other:?}"),
                "Set driver to one of: sqlite, postgres, mysql",
            )),
        }
    }
}

/// Quote an identifier for `dialect`. See [`Dialect::quote_identifier`].
pub fn quote_identifier(dialect: Dialect, name: &str) -> String {
    dialect.quote_identifier(name)
}

/// Escape a string for use inside a single-quoted SQLite literal.
///
/// Only for catalog lookups that cannot take bound parameters. User values
/// always go through parameter binding.
pub fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_simple() {
        assert_eq!(quote_identifier(Dialect::Postgres, "users"), r#""users""#);
        assert_eq!(quote_identifier(Dialect::Sqlite, "users"), r#""users""#);
        assert_eq!(quote_identifier(Dialect::MySql, "users"), "`users`");
        assert_eq!(quote_identifier(Dialect::Postgres, "select"), r#""select""#);
        assert_eq!(quote_identifier(Dialect::Postgres, "user-data"), r#""user-data""#);
        assert_eq!(quote_identifier(Dialect::MySql, "my table"), "`my table`");
    }

    #[test]
    fn test_quote_identifier_doubles_embedded_quotes() {
        assert_eq!(
            quote_identifier(Dialect::Postgres, r#"users"; DROP TABLE users; --"#),
            r#""users""; DROP TABLE users; --""#
        );
        assert_eq!(
            quote_identifier(Dialect::Sqlite, r#"users"; DELETE FROM users; --"#),
            r#""users""; DELETE FROM users; --""#
        );
        assert_eq!(
            quote_identifier(Dialect::MySql, "users`; DROP TABLE users; --"),
            "`users``; DROP TABLE users; --`"
        );
    }

    #[test]
    fn test_quote_identifier_never_leaves_unescaped_quote() {
        let inputs = [
            r#""; DROP TABLE users; --"#,
            "`; DROP TABLE users; --",
            "'; DELETE FROM users; --",
            "table; INSERT INTO users VALUES(1); --",
            "users UNION SELECT * FROM passwords",
            r#""""#,
            "``",
            "",
        ];

        for dialect in Dialect::ALL {
            let q = dialect.quote_char();
            for input in inputs {
                let quoted = dialect.quote_identifier(input);
                assert!(quoted.starts_with(q) && quoted.ends_with(q), "{dialect}: {quoted}");
                assert!(quoted.len() >= 2);

                // Inside the wrapping quotes, quote characters only appear in pairs.
                let inner: Vec<char> = quoted.chars().skip(1).collect();
                let inner = &inner[..inner.len() - 1];
                let mut i = 0;
                while i < inner.len() {
                    if inner[i] == q {
                        assert_eq!(inner.get(i + 1), Some(&q), "{dialect}: lone quote in {quoted}");
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
            }
        }
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("users"), "users");
        assert_eq!(escape_literal("users'; DROP TABLE users; --"), "users''; DROP TABLE users; --");
        assert_eq!(escape_literal("it's a user's table"), "it''s a user''s table");
        assert_eq!(escape_literal(""), "");
        assert_eq!(escape_literal("'"), "''");
        assert_eq!(escape_literal("'''"), "''''''");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(12), "$12");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("sqlite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);

        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!("".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_serde_aliases() {
        let d: Dialect = serde_json::from_str(r#""postgresql""#).unwrap();
        assert_eq!(d, Dialect::Postgres);
        let d: Dialect = serde_json::from_str(r#""sqlite3""#).unwrap();
        assert_eq!(d, Dialect::Sqlite);
        assert_eq!(serde_json::to_string(&Dialect::MySql).unwrap(), r#""mysql""#);
        assert!(serde_json::from_str::<Dialect>(r#""mssql""#).is_err());
    }

    #[test]
    fn test_sqlite_columns_sql_escapes_table() {
        assert_eq!(
            Dialect::Sqlite.list_columns_sql("o'brien"),
            "PRAGMA table_info('o''brien')"
        );
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Dialect::Postgres.default_port(), Some(5432));
        assert_eq!(Dialect::MySql.default_port(), Some(3306));
        assert_eq!(Dialect::Sqlite.default_port(), None);
    }
}
