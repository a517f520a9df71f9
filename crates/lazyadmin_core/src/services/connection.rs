//! Opening and owning live database connections.
//!
//! [`ConnectionManager::connect`] turns a [`ConnectionDescriptor`] into a
//! [`Connection`]:
//! - opens the SSH tunnel first when one is configured
//! - rewrites host/port to the tunnel's local endpoint
//! - builds the dialect's connection parameters
//! - opens the handle and runs a liveness check
//!
//! Any failure after the tunnel is up closes everything opened so far.

use crate::dialect::Dialect;
use crate::error::{LazyAdminError, Result};
use crate::models::connection::{ConnectionDescriptor, SslMode};
use crate::models::value::Value;
use crate::services::rows::{self, DecodedRows};
use crate::services::tunnel::SshTunnel;

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use futures_util::{pin_mut, TryStreamExt};
use native_tls::TlsConnector;
use parking_lot::Mutex;
use postgres_native_tls::MakeTlsConnector;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::{Column as _, Executor as _};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use uuid::Uuid;

/// Timeout for establishing a database connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connections kept by the server-dialect pools.
const POOL_MAX_SIZE: usize = 2;

const APPLICATION_NAME: &str = "lazyadmin";

// ========== Connection parameters ==========

/// Structured MySQL connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct MySqlDsn {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Default database (may be empty).
    pub database: String,
}

impl MySqlDsn {
    /// Build sqlx connect options.
    pub fn to_connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .ssl_mode(MySqlSslMode::Disabled);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        if !self.database.is_empty() {
            options = options.database(&self.database);
        }
        options
    }
}

/// Redacted `user:***@tcp(host:port)/database` form.
impl fmt::Display for MySqlDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { ":********" };
        write!(
            f,
            "{}{}@tcp({}:{})/{}",
            self.user, password, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for MySqlDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MySqlDsn({self})")
    }
}

/// Dialect-specific connection parameters derived from a descriptor.
#[derive(Clone)]
pub enum ConnectionParams {
    /// SQLite database file.
    Sqlite {
        /// File to open.
        path: PathBuf,
    },
    /// libpq-style `key=value` connection string plus TLS settings.
    Postgres {
        /// Connection string.
        dsn: String,
        /// Requested SSL mode.
        ssl_mode: SslMode,
        /// CA certificate for the verifying modes.
        ca_cert: Option<PathBuf>,
    },
    /// Structured MySQL settings.
    MySql(MySqlDsn),
}

impl ConnectionParams {
    /// Build parameters for `desc`, connecting to `endpoint` when given
    /// (the tunnel's local address) instead of the descriptor's host/port.
    pub fn from_descriptor(
        desc: &ConnectionDescriptor,
        endpoint: Option<SocketAddr>,
    ) -> Result<Self> {
        let (host, port) = match endpoint {
            Some(addr) => (addr.ip().to_string(), addr.port()),
            None => (desc.host.clone(), desc.effective_port()),
        };

        match desc.driver {
            Dialect::Sqlite => {
                let path = desc.sqlite_path().ok_or_else(|| {
                    LazyAdminError::config("SQLite connection needs a file path")
                })?;
                Ok(Self::Sqlite { path })
            }
            Dialect::Postgres => {
                let ssl_mode = desc.effective_ssl_mode();
                let dsn =
                    postgres_dsn(&host, port, &desc.user, &desc.password, &desc.name, ssl_mode);
                Ok(Self::Postgres { dsn, ssl_mode, ca_cert: desc.ssl_ca_cert.clone() })
            }
            Dialect::MySql => Ok(Self::MySql(MySqlDsn {
                host,
                port,
                user: desc.user.clone(),
                password: desc.password.clone(),
                database: desc.name.clone(),
            })),
        }
    }

    /// Dialect these parameters connect to.
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite { .. } => Dialect::Sqlite,
            Self::Postgres { .. } => Dialect::Postgres,
            Self::MySql(_) => Dialect::MySql,
        }
    }

    /// Loggable form with the password masked.
    pub fn redacted(&self) -> String {
        match self {
            Self::Sqlite { path } => path.display().to_string(),
            Self::Postgres { dsn, .. } => redact_dsn(dsn),
            Self::MySql(dsn) => dsn.to_string(),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionParams({:?}: {})", self.dialect(), self.redacted())
    }
}

/// Build a PostgreSQL `key=value` connection string.
pub fn postgres_dsn(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    dbname: &str,
    ssl_mode: SslMode,
) -> String {
    let mut parts = vec![format!("host={}", dsn_value(host)), format!("port={port}")];
    if !user.is_empty() {
        parts.push(format!("user={}", dsn_value(user)));
    }
    if !password.is_empty() {
        parts.push(format!("password={}", dsn_value(password)));
    }
    if !dbname.is_empty() {
        parts.push(format!("dbname={}", dsn_value(dbname)));
    }
    parts.push(format!("sslmode={}", ssl_mode.dsn_value()));
    parts.join(" ")
}

/// Quote a connection-string value when it contains spaces, quotes or
/// backslashes.
fn dsn_value(value: &str) -> String {
    let needs_quotes =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn redact_dsn(dsn: &str) -> String {
    // Parse key=value pairs honoring quotes so quoted passwords with spaces
    // are masked whole.
    let mut out = Vec::new();
    let mut rest = dsn.trim_start();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            out.push(rest.to_string());
            break;
        };
        let key = &rest[..eq];
        let after = &rest[eq + 1..];
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('\'') {
            let mut end = quoted.len();
            let mut escaped = false;
            for (i, c) in quoted.char_indices() {
                match c {
                    '\\' if !escaped => escaped = true,
                    '\'' if !escaped => {
                        end = i;
                        break;
                    }
                    _ => escaped = false,
                }
            }
            let consumed = (end + 2).min(after.len());
            (&after[..consumed], &after[consumed..])
        } else {
            let end = after.find(' ').unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        if key == "password" {
            out.push("password=********".to_string());
        } else {
            out.push(format!("{key}={value}"));
        }
        rest = remaining.trim_start();
    }
    out.join(" ")
}

// ========== Live connection ==========

/// Driver handle behind a [`Connection`].
pub(crate) enum DbHandle {
    Sqlite(Arc<Mutex<rusqlite::Connection>>),
    Postgres(Pool),
    MySql(MySqlPool),
}

/// A live database connection, plus the tunnel it runs through if any.
pub struct Connection {
    id: Uuid,
    label: String,
    dialect: Dialect,
    target: String,
    handle: DbHandle,
    tunnel: Option<SshTunnel>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Unique identifier of this connection instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display label from the descriptor.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Dialect of the connected engine.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Credential-free description of the target.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// When the connection was established.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// The tunnel this connection runs through, if any.
    pub fn tunnel(&self) -> Option<&SshTunnel> {
        self.tunnel.as_ref()
    }

    /// Run a trivial round-trip.
    pub async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[], Some(1)).await.map(|_| ())
    }

    /// Execute a statement and return the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(dialect = %self.dialect, sql, params = params.len(), "Executing statement");
        match &self.handle {
            DbHandle::Sqlite(conn) => {
                let sql = sql.to_string();
                let params = params.to_vec();
                with_sqlite(conn, move |conn| {
                    let changed =
                        conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
                    Ok(changed as u64)
                })
                .await
            }
            DbHandle::Postgres(pool) => {
                let client = pool.get().await?;
                let refs: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                Ok(client.execute(sql, &refs).await?)
            }
            DbHandle::MySql(pool) => {
                let query = params.iter().fold(sqlx::query(sql), bind_mysql);
                Ok(query.execute(pool).await?.rows_affected())
            }
        }
    }

    /// Run a query and decode its rows.
    ///
    /// With `limit`, at most that many rows are read and `truncated` reports
    /// whether more were available. Column names are reported even when no
    /// row is returned.
    pub async fn query(
        &self,
        sql: &str,
        params: &[Value],
        limit: Option<usize>,
    ) -> Result<DecodedRows> {
        tracing::debug!(dialect = %self.dialect, sql, params = params.len(), "Running query");
        let limit = limit.unwrap_or(usize::MAX);
        match &self.handle {
            DbHandle::Sqlite(conn) => {
                let sql = sql.to_string();
                let params = params.to_vec();
                with_sqlite(conn, move |conn| {
                    let mut stmt = conn.prepare(&sql)?;
                    let columns: Vec<String> =
                        stmt.column_names().into_iter().map(String::from).collect();
                    let width = columns.len();
                    let mut decoded = DecodedRows { columns, ..Default::default() };
                    let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                    while let Some(row) = cursor.next()? {
                        if decoded.rows.len() == limit {
                            decoded.truncated = true;
                            break;
                        }
                        decoded.rows.push(rows::sqlite_row(row, width)?);
                    }
                    Ok(decoded)
                })
                .await
            }
            DbHandle::Postgres(pool) => {
                let client = pool.get().await?;
                let stmt = client.prepare(sql).await?;
                let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
                let mut decoded = DecodedRows { columns, ..Default::default() };

                // The text protocol renders every type the way the server prints it
                let text_only =
                    stmt.columns().iter().any(|c| !rows::pg_decodes_natively(c.type_()));
                if text_only && params.is_empty() {
                    tracing::debug!(sql, "Falling back to the simple query protocol");
                    for message in client.simple_query(sql).await? {
                        let SimpleQueryMessage::Row(row) = message else {
                            continue;
                        };
                        if decoded.rows.len() == limit {
                            decoded.truncated = true;
                            break;
                        }
                        decoded.rows.push(rows::pg_text_row(&row));
                    }
                    return Ok(decoded);
                }

                let stream = client
                    .query_raw(&stmt, params.iter().map(|p| p as &(dyn ToSql + Sync)))
                    .await?;
                pin_mut!(stream);
                while let Some(row) = stream.try_next().await? {
                    if decoded.rows.len() == limit {
                        decoded.truncated = true;
                        break;
                    }
                    decoded.rows.push(rows::pg_row(&row)?);
                }
                Ok(decoded)
            }
            DbHandle::MySql(pool) => {
                let mut decoded = DecodedRows::default();
                {
                    let query = params.iter().fold(sqlx::query(sql), bind_mysql);
                    let mut stream = query.fetch(pool);
                    while let Some(row) = stream.try_next().await? {
                        if decoded.columns.is_empty() {
                            decoded.columns = rows::mysql_columns(&row);
                        }
                        if decoded.rows.len() == limit {
                            decoded.truncated = true;
                            break;
                        }
                        decoded.rows.push(rows::mysql_row(&row));
                    }
                }
                if decoded.columns.is_empty() {
                    let described = pool.describe(sql).await?;
                    decoded.columns =
                        described.columns().iter().map(|c| c.name().to_string()).collect();
                }
                Ok(decoded)
            }
        }
    }

    /// Close the handle and the tunnel.
    ///
    /// Both are attempted even if one fails; failures are logged, never
    /// returned.
    pub async fn close(self) {
        let Self { id, handle, tunnel, .. } = self;
        match handle {
            DbHandle::Sqlite(conn) => match Arc::try_unwrap(conn) {
                Ok(conn) => {
                    if let Err((_, e)) = conn.into_inner().close() {
                        tracing::warn!(
                            connection_id = %id,
                            error = %e,
                            "Failed to close SQLite handle"
                        );
                    }
                }
                Err(_) => {
                    tracing::warn!(connection_id = %id, "SQLite handle still in use; dropping")
                }
            },
            DbHandle::Postgres(pool) => pool.close(),
            DbHandle::MySql(pool) => pool.close().await,
        }
        if let Some(tunnel) = tunnel {
            tunnel.close().await;
        }
        tracing::info!(connection_id = %id, "Connection closed");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("dialect", &self.dialect)
            .field("target", &self.target)
            .field("tunnel", &self.tunnel)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
    }
}

/// Run blocking SQLite work off the async runtime.
async fn with_sqlite<T, F>(conn: &Arc<Mutex<rusqlite::Connection>>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || f(&mut conn.lock()))
        .await
        .map_err(|e| LazyAdminError::internal(format!("SQLite task failed: {e}")))?
}

// ========== Manager ==========

/// Opens connections from descriptors.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Connect to the database described by `desc`.
    ///
    /// Configuration problems fail before any I/O. A tunnel failure fails the
    /// whole call; a handle or liveness failure closes the tunnel first.
    pub async fn connect(desc: &ConnectionDescriptor) -> Result<Connection> {
        desc.validate()?;

        let tunnel = match &desc.ssh {
            Some(tunnel_desc) => {
                let tunnel =
                    SshTunnel::open(tunnel_desc, &desc.host, desc.effective_port()).await?;
                Some(tunnel)
            }
            None => None,
        };

        let endpoint = tunnel.as_ref().map(SshTunnel::local_addr);
        let opened = match ConnectionParams::from_descriptor(desc, endpoint) {
            Ok(params) => Self::open(&params).await,
            Err(e) => Err(e),
        };

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(tunnel) = &tunnel {
                    tunnel.close().await;
                }
                return Err(e);
            }
        };

        let connection = Connection {
            id: Uuid::new_v4(),
            label: desc.label.clone(),
            dialect: desc.driver,
            target: desc.display_target(),
            handle,
            tunnel,
            connected_at: Utc::now(),
        };

        if let Err(e) = connection.ping().await {
            tracing::warn!(target = %connection.target, error = %e, "Liveness check failed");
            connection.close().await;
            return Err(match e {
                e if e.is_connectivity() => e,
                e => LazyAdminError::connection_with_source("Connection validation failed", e),
            });
        }

        tracing::info!(
            connection_id = %connection.id,
            dialect = %connection.dialect,
            target = %connection.target,
            tunneled = connection.tunnel.is_some(),
            "Connection established"
        );
        Ok(connection)
    }

    /// Open the driver handle for `params`.
    async fn open(params: &ConnectionParams) -> Result<DbHandle> {
        tracing::debug!(params = %params.redacted(), "Opening database handle");
        match params {
            ConnectionParams::Sqlite { path } => {
                let path = path.clone();
                let conn = tokio::task::spawn_blocking(move || rusqlite::Connection::open(path))
                    .await
                    .map_err(|e| LazyAdminError::internal(format!("SQLite task failed: {e}")))??;
                Ok(DbHandle::Sqlite(Arc::new(Mutex::new(conn))))
            }
            ConnectionParams::Postgres { dsn, ssl_mode, ca_cert } => {
                let mut pg_config: tokio_postgres::Config = dsn.parse().map_err(|e| {
                    LazyAdminError::config(format!("Invalid PostgreSQL connection string: {e}"))
                })?;
                pg_config.application_name(APPLICATION_NAME);
                pg_config.connect_timeout(CONNECT_TIMEOUT);

                let manager_config = ManagerConfig { recycling_method: RecyclingMethod::Fast };
                let manager = match ssl_mode {
                    SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
                    mode => {
                        let tls = tls_connector(*mode, ca_cert.as_deref())?;
                        Manager::from_config(pg_config, tls, manager_config)
                    }
                };

                let pool = Pool::builder(manager)
                    .max_size(POOL_MAX_SIZE)
                    .wait_timeout(Some(CONNECT_TIMEOUT))
                    .create_timeout(Some(CONNECT_TIMEOUT))
                    .runtime(Runtime::Tokio1)
                    .build()
                    .map_err(|e| {
                        LazyAdminError::connection(format!("Failed to create pool: {e}"))
                    })?;
                Ok(DbHandle::Postgres(pool))
            }
            ConnectionParams::MySql(dsn) => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(POOL_MAX_SIZE as u32)
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect_with(dsn.to_connect_options())
                    .await?;
                Ok(DbHandle::MySql(pool))
            }
        }
    }
}

/// TLS connector for the PostgreSQL SSL modes that use TLS.
///
/// `prefer` and `require` skip certificate checks; `verify-ca` checks the
/// chain only; `verify-full` also checks the hostname.
fn tls_connector(mode: SslMode, ca_cert: Option<&std::path::Path>) -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    match mode {
        SslMode::Disable | SslMode::Prefer | SslMode::Require => {
            builder.danger_accept_invalid_certs(true);
        }
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyFull => {}
    }

    if let Some(path) = ca_cert {
        let cert_data = std::fs::read(path).map_err(|e| {
            LazyAdminError::config_with_hint(
                format!("Failed to read CA certificate: {e}"),
                "Check that the certificate file exists and is readable",
            )
        })?;
        let cert = native_tls::Certificate::from_pem(&cert_data).map_err(|e| {
            LazyAdminError::config_with_hint(
                format!("Failed to parse CA certificate: {e}"),
                "Ensure the certificate is in PEM format",
            )
        })?;
        builder.add_root_certificate(cert);
    }

    let connector = builder.build().map_err(|e| {
        LazyAdminError::connection_with_hint(
            format!("Failed to create TLS connector: {e}"),
            "Check your system's TLS configuration",
        )
    })?;
    Ok(MakeTlsConnector::new(connector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::connection::TunnelDescriptor;
    use tempfile::TempDir;

    #[test]
    fn test_postgres_dsn_defaults_ssl_disable() {
        let desc = ConnectionDescriptor::postgres("db.internal", "app", "pw", "main");
        let params = ConnectionParams::from_descriptor(&desc, None).unwrap();
        match params {
            ConnectionParams::Postgres { dsn, ssl_mode, .. } => {
                assert_eq!(
                    dsn,
                    "host=db.internal port=5432 user=app password=pw dbname=main sslmode=disable"
                );
                assert_eq!(ssl_mode, SslMode::Disable);
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn test_postgres_dsn_quotes_values() {
        let dsn = postgres_dsn("h", 5432, "app", "it's a secret", "", SslMode::VerifyFull);
        assert_eq!(dsn, r"host=h port=5432 user=app password='it\'s a secret' sslmode=require");
        let parsed: tokio_postgres::Config = dsn.parse().unwrap();
        assert_eq!(parsed.get_password(), Some(&b"it's a secret"[..]));
    }

    #[test]
    fn test_endpoint_substitution() {
        let desc = ConnectionDescriptor::mysql("10.0.0.5", "app", "pw", "shop");
        let endpoint: SocketAddr = "127.0.0.1:40123".parse().unwrap();
        match ConnectionParams::from_descriptor(&desc, Some(endpoint)).unwrap() {
            ConnectionParams::MySql(dsn) => {
                assert_eq!(dsn.host, "127.0.0.1");
                assert_eq!(dsn.port, 40123);
                assert_eq!(dsn.database, "shop");
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn test_redaction() {
        let desc = ConnectionDescriptor::postgres("h", "app", "hunter 2", "main");
        let params = ConnectionParams::from_descriptor(&desc, None).unwrap();
        let redacted = params.redacted();
        assert!(!redacted.contains("hunter"));
        assert!(redacted.contains("password=********"));
        assert!(redacted.contains("dbname=main"));

        let my = MySqlDsn {
            host: "h".into(),
            port: 3306,
            user: "app".into(),
            password: "hunter2".into(),
            database: "shop".into(),
        };
        assert_eq!(my.to_string(), "app:********@tcp(h:3306)/shop");
        assert!(!format!("{my:?}").contains("hunter2"));
    }

    #[test]
    fn test_sqlite_params_use_name_fallback() {
        let mut desc = ConnectionDescriptor::sqlite("");
        desc.name = "app.db".into();
        match ConnectionParams::from_descriptor(&desc, None).unwrap() {
            ConnectionParams::Sqlite { path } => assert_eq!(path, PathBuf::from("app.db")),
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_sqlite_and_close() {
        let dir = TempDir::new().unwrap();
        let desc = ConnectionDescriptor::sqlite(dir.path().join("app.db")).with_label("local");
        let conn = ConnectionManager::connect(&desc).await.unwrap();
        assert_eq!(conn.dialect(), Dialect::Sqlite);
        assert_eq!(conn.label(), "local");
        assert!(conn.tunnel().is_none());

        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).await.unwrap();
        let n = conn
            .execute("INSERT INTO t (v) VALUES (?)", &[Value::Text("x".into())])
            .await
            .unwrap();
        assert_eq!(n, 1);

        let rows = conn.query("SELECT id, v FROM t WHERE 1 = 0", &[], None).await.unwrap();
        assert_eq!(rows.columns, vec!["id", "v"]);
        assert!(rows.rows.is_empty());

        conn.ping().await.unwrap();
        conn.close().await;
    }

    #[tokio::test]
    async fn test_query_limit_sets_truncated() {
        let dir = TempDir::new().unwrap();
        let conn =
            ConnectionManager::connect(&ConnectionDescriptor::sqlite(dir.path().join("a.db")))
                .await
                .unwrap();
        conn.execute("CREATE TABLE n (x INTEGER)", &[]).await.unwrap();
        for i in 0..5 {
            conn.execute("INSERT INTO n VALUES (?)", &[Value::Int(i)]).await.unwrap();
        }
        let rows = conn.query("SELECT x FROM n ORDER BY x", &[], Some(3)).await.unwrap();
        assert_eq!(rows.rows.len(), 3);
        assert!(rows.truncated);

        let rows = conn.query("SELECT x FROM n", &[], Some(5)).await.unwrap();
        assert!(!rows.truncated);
        conn.close().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_descriptor_before_io() {
        let desc = ConnectionDescriptor::postgres("", "app", "pw", "main");
        let err = ConnectionManager::connect(&desc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let desc = ConnectionDescriptor::postgres("10.0.0.5", "app", "pw", "main")
            .with_tunnel(TunnelDescriptor::new("192.0.2.1", "ops"));
        let err = ConnectionManager::connect(&desc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connectivity_error() {
        // Bind then drop a listener to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let desc =
            ConnectionDescriptor::postgres("127.0.0.1", "app", "pw", "main").with_port(port);
        let err = ConnectionManager::connect(&desc).await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {err:?}");
    }
}
