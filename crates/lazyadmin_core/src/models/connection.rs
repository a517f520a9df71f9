//! Connection and tunnel descriptors.

use crate::dialect::Dialect;
use crate::error::{LazyAdminError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default cap on concurrently forwarded tunnel connections.
pub const DEFAULT_MAX_TUNNEL_CONNECTIONS: usize = 64;

/// SSL mode for PostgreSQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No SSL (default).
    #[default]
    Disable,
    /// Use SSL if available.
    Prefer,
    /// Require SSL, accept any certificate.
    Require,
    /// Require SSL, verify CA.
    VerifyCa,
    /// Require SSL, verify CA and hostname.
    VerifyFull,
}

impl SslMode {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Value for the `sslmode` key of a libpq-style connection string.
    ///
    /// The verifying modes are enforced by the TLS connector, so the
    /// connection string only asks for TLS to be required.
    pub fn dsn_value(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require | Self::VerifyCa | Self::VerifyFull => "require",
        }
    }
}

/// How the SSH server's host key is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// The key must be present in `known_hosts` (default).
    #[default]
    Strict,
    /// Accept any host key. Opt-in only; vulnerable to man-in-the-middle.
    AcceptAny,
}

/// Resolved SSH authentication method.
#[derive(Clone, PartialEq, Eq)]
pub enum SshAuth {
    /// Private key file, optionally decrypted with a passphrase.
    PrivateKey {
        /// Path to the key file.
        path: PathBuf,
        /// Passphrase (taken from the tunnel's password field).
        passphrase: Option<String>,
    },
    /// Plain password.
    Password(String),
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "********"))
                .finish(),
            Self::Password(_) => f.debug_tuple("Password").field(&"********").finish(),
        }
    }
}

/// SSH tunnel settings for reaching a database that is not directly routable.
#[derive(Clone, Serialize, Deserialize)]
pub struct TunnelDescriptor {
    /// SSH server hostname.
    pub host: String,
    /// SSH server port (0 means 22).
    #[serde(default)]
    pub port: u16,
    /// SSH username.
    pub user: String,
    /// Password, or the private key's passphrase when `private_key` is set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Path to a private key file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
    /// Host-key verification policy.
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    /// Custom known_hosts file (defaults to `~/.ssh/known_hosts`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts: Option<PathBuf>,
    /// Maximum concurrently forwarded connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl TunnelDescriptor {
    /// Create a tunnel descriptor with no credentials yet.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            password: String::new(),
            private_key: None,
            host_key_policy: HostKeyPolicy::Strict,
            known_hosts: None,
            max_connections: None,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password (or key passphrase).
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set a private key file.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Set the host-key policy.
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Port to dial, applying the SSH default.
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        }
    }

    /// Concurrency cap for forwarded connections.
    pub fn effective_max_connections(&self) -> usize {
        self.max_connections.filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_TUNNEL_CONNECTIONS)
    }

    /// Derive the authentication method.
    ///
    /// A private key wins over a password; the password then serves as the
    /// key's passphrase. Fails when neither is configured.
    pub fn auth(&self) -> Result<SshAuth> {
        let password = (!self.password.is_empty()).then(|| self.password.clone());
        match (&self.private_key, password) {
            (Some(path), passphrase) if !path.as_os_str().is_empty() => {
                Ok(SshAuth::PrivateKey { path: path.clone(), passphrase })
            }
            (_, Some(password)) => Ok(SshAuth::Password(password)),
            _ => Err(LazyAdminError::config_with_hint(
                format!("No SSH authentication method configured for {}@{}", self.user, self.host),
                "Set either a password or a private_key for the tunnel",
            )),
        }
    }

    /// Validate the descriptor.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(LazyAdminError::config("SSH host is required"));
        }
        if self.user.trim().is_empty() {
            return Err(LazyAdminError::config("SSH user is required"));
        }
        self.auth().map(|_| ())
    }
}

impl fmt::Debug for TunnelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("private_key", &self.private_key)
            .field("host_key_policy", &self.host_key_policy)
            .field("known_hosts", &self.known_hosts)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Everything needed to reach one database.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Database engine.
    pub driver: Dialect,
    /// Server hostname (client-server dialects).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// Server port (0 means the dialect default).
    #[serde(default)]
    pub port: u16,
    /// Login username.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Login password.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Database name; for SQLite, the file used when `path` is empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// PostgreSQL SSL mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<SslMode>,
    /// PostgreSQL CA certificate (PEM) for the verifying SSL modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_ca_cert: Option<PathBuf>,
    /// SQLite database file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Optional SSH tunnel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<TunnelDescriptor>,
}

impl ConnectionDescriptor {
    fn empty(driver: Dialect) -> Self {
        Self {
            label: String::new(),
            driver,
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            ssl_mode: None,
            ssl_ca_cert: None,
            path: None,
            ssh: None,
        }
    }

    /// Descriptor for a SQLite file.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()), ..Self::empty(Dialect::Sqlite) }
    }

    /// Descriptor for a PostgreSQL server on the default port.
    pub fn postgres(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            name: database.into(),
            ..Self::empty(Dialect::Postgres)
        }
    }

    /// Descriptor for a MySQL server on the default port.
    pub fn mysql(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            name: database.into(),
            ..Self::empty(Dialect::MySql)
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the SSL mode.
    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = Some(ssl_mode);
        self
    }

    /// Route the connection through an SSH tunnel.
    pub fn with_tunnel(mut self, tunnel: TunnelDescriptor) -> Self {
        self.ssh = Some(tunnel);
        self
    }

    /// Port to connect to, applying the dialect default when unset.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.driver.default_port()) {
            (0, Some(default)) => default,
            (port, _) => port,
        }
    }

    /// SSL mode, defaulting to `Disable`.
    pub fn effective_ssl_mode(&self) -> SslMode {
        self.ssl_mode.unwrap_or_default()
    }

    /// SQLite file: `path`, falling back to the database name.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| (!self.name.is_empty()).then(|| PathBuf::from(&self.name)))
    }

    /// Fill in defaults: dialect port and tunnel port.
    pub fn apply_defaults(&mut self) {
        self.port = self.effective_port();
        if let Some(tunnel) = self.ssh.as_mut() {
            tunnel.port = tunnel.effective_port();
        }
    }

    /// Validate the descriptor. Runs before any network I/O.
    pub fn validate(&self) -> Result<()> {
        match self.driver {
            Dialect::Sqlite => {
                if self.sqlite_path().is_none() {
                    return Err(LazyAdminError::config_with_hint(
                        "SQLite connection needs a file path",
                        "Set path (or name) to the database file",
                    ));
                }
                if self.ssh.is_some() {
                    return Err(LazyAdminError::config(
                        "SSH tunnels are only supported for postgres and mysql connections",
                    ));
                }
            }
            Dialect::Postgres | Dialect::MySql => {
                if self.host.trim().is_empty() {
                    return Err(LazyAdminError::config(format!(
                        "{} connection needs a host",
                        self.driver
                    )));
                }
                if self.user.trim().is_empty() {
                    return Err(LazyAdminError::config(format!(
                        "{} connection needs a user",
                        self.driver
                    )));
                }
            }
        }
        if let Some(tunnel) = &self.ssh {
            tunnel.validate()?;
        }
        Ok(())
    }

    /// Human-readable target without credentials.
    pub fn display_target(&self) -> String {
        match self.driver {
            Dialect::Sqlite => format!(
                "sqlite://{}",
                self.sqlite_path().map(|p| p.display().to_string()).unwrap_or_default()
            ),
            driver => format!(
                "{}://{}@{}:{}/{}",
                driver,
                self.user,
                self.host,
                self.effective_port(),
                self.name
            ),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("label", &self.label)
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("name", &self.name)
            .field("ssl_mode", &self.ssl_mode)
            .field("path", &self.path)
            .field("ssh", &self.ssh)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "********"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_port_defaults() {
        let pg = ConnectionDescriptor::postgres("db", "app", "pw", "main");
        assert_eq!(pg.effective_port(), 5432);
        assert_eq!(pg.clone().with_port(6543).effective_port(), 6543);

        let my = ConnectionDescriptor::mysql("db", "app", "pw", "main");
        assert_eq!(my.effective_port(), 3306);

        let lite = ConnectionDescriptor::sqlite("/tmp/x.db");
        assert_eq!(lite.effective_port(), 0);
    }

    #[test]
    fn test_sqlite_path_falls_back_to_name() {
        let mut d = ConnectionDescriptor::sqlite("");
        assert!(d.sqlite_path().is_none());
        assert!(d.validate().is_err());

        d.name = "fallback.db".to_string();
        assert_eq!(d.sqlite_path(), Some(PathBuf::from("fallback.db")));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_server_dialect_requires_host() {
        let d = ConnectionDescriptor::postgres("", "app", "pw", "main");
        let err = d.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_tunnel_auth_precedence() {
        let t = TunnelDescriptor::new("bastion", "ops").with_password("secret");
        assert_eq!(t.auth().unwrap(), SshAuth::Password("secret".to_string()));

        let t = t.with_private_key("/home/ops/.ssh/id_ed25519");
        assert_eq!(
            t.auth().unwrap(),
            SshAuth::PrivateKey {
                path: PathBuf::from("/home/ops/.ssh/id_ed25519"),
                passphrase: Some("secret".to_string()),
            }
        );

        let t = TunnelDescriptor::new("bastion", "ops").with_private_key("/k");
        assert_eq!(
            t.auth().unwrap(),
            SshAuth::PrivateKey { path: PathBuf::from("/k"), passphrase: None }
        );
    }

    #[test]
    fn test_tunnel_without_auth_fails_validation() {
        let t = TunnelDescriptor::new("bastion", "ops");
        assert!(t.auth().is_err());
        let d = ConnectionDescriptor::postgres("10.0.0.5", "app", "pw", "main").with_tunnel(t);
        assert_eq!(d.validate().unwrap_err().kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_apply_defaults() {
        let mut d = ConnectionDescriptor::mysql("db", "app", "pw", "main")
            .with_tunnel(TunnelDescriptor::new("bastion", "ops").with_port(0).with_password("x"));
        d.apply_defaults();
        assert_eq!(d.port, 3306);
        assert_eq!(d.ssh.as_ref().unwrap().port, 22);
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let d = ConnectionDescriptor::postgres("db", "app", "hunter2", "main")
            .with_tunnel(TunnelDescriptor::new("bastion", "ops").with_password("sshpass"));
        let dbg = format!("{d:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("sshpass"));
        assert!(dbg.contains("********"));
    }

    #[test]
    fn test_ssl_mode_dsn_value() {
        assert_eq!(SslMode::VerifyCa.dsn_value(), "require");
        assert_eq!(SslMode::default().dsn_value(), "disable");
    }

    #[test]
    fn test_deserialize_descriptor() {
        let json = r#"{
            "label": "prod",
            "driver": "postgresql",
            "host": "10.0.0.5",
            "user": "app",
            "password": "pw",
            "name": "main",
            "ssl_mode": "require",
            "ssh": {
                "host": "bastion",
                "user": "ops",
                "private_key": "/k",
                "host_key_policy": "accept-any"
            }
        }"#;
        let d: ConnectionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.driver, Dialect::Postgres);
        assert_eq!(d.effective_port(), 5432);
        assert_eq!(d.effective_ssl_mode(), SslMode::Require);
        let ssh = d.ssh.unwrap();
        assert_eq!(ssh.effective_port(), 22);
        assert_eq!(ssh.host_key_policy, HostKeyPolicy::AcceptAny);
    }

    #[test]
    fn test_display_target_has_no_password() {
        let d = ConnectionDescriptor::postgres("db", "app", "hunter2", "main");
        assert_eq!(d.display_target(), "postgres://app@db:5432/main");
    }
}
