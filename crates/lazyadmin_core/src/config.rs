//! Application configuration file.
//!
//! The configuration is a plain value: mutating methods take `self` and
//! return the updated config, and persistence is an explicit [`AppConfig::save`].

use crate::error::{LazyAdminError, Result};
use crate::models::connection::ConnectionDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lazyadmin.json";

/// A named ad hoc query shown alongside the tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedView {
    /// Display title.
    pub title: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// SQL executed verbatim.
    pub query: String,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Project name shown in the header.
    #[serde(default)]
    pub project_name: String,
    /// Single-connection form from older config files; promoted into
    /// `connections` on load and never written back.
    #[serde(default, skip_serializing)]
    pub database: Option<ConnectionDescriptor>,
    /// Configured connections.
    #[serde(default)]
    pub connections: Vec<ConnectionDescriptor>,
    /// Saved views.
    #[serde(default)]
    pub views: Vec<SavedView>,
}

impl AppConfig {
    /// Read, normalize and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            LazyAdminError::config_with_hint(
                format!("Failed to read config file {}: {e}", path.display()),
                "Pass the config path as the first argument",
            )
        })?;
        let config = Self::from_json(&data)?;
        tracing::debug!(
            path = %path.display(),
            connections = config.connections.len(),
            views = config.views.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse, normalize and validate config JSON.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.normalized()
    }

    /// Promote the legacy field, apply defaults and validate every connection.
    pub fn normalized(mut self) -> Result<Self> {
        if self.connections.is_empty() {
            if let Some(mut legacy) = self.database.take() {
                if legacy.label.is_empty() {
                    legacy.label = "Default".to_string();
                }
                self.connections.push(legacy);
            }
        }
        self.database = None;

        if self.connections.is_empty() {
            return Err(LazyAdminError::config_with_hint(
                "no database connections defined",
                "Add at least one entry to connections",
            ));
        }

        for (i, conn) in self.connections.iter_mut().enumerate() {
            conn.apply_defaults();
            if conn.label.is_empty() {
                conn.label = format!("Connection {}", i + 1);
            }
            conn.validate().map_err(|e| {
                LazyAdminError::config(format!("connection {} ({}): {e}", i + 1, conn.label))
            })?;
        }

        Ok(self)
    }

    /// Write the config as pretty JSON, readable only by the owner on Unix.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        write_private(path, data.as_bytes()).map_err(|e| {
            LazyAdminError::config(format!("Failed to write config file {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Connection by label.
    pub fn connection(&self, label: &str) -> Option<&ConnectionDescriptor> {
        self.connections.iter().find(|c| c.label == label)
    }

    /// Add a connection, or replace the one with the same label.
    pub fn with_connection(mut self, mut desc: ConnectionDescriptor) -> Result<Self> {
        desc.apply_defaults();
        if desc.label.is_empty() {
            desc.label = format!("Connection {}", self.connections.len() + 1);
        }
        desc.validate()?;
        match self.connections.iter_mut().find(|c| c.label == desc.label) {
            Some(existing) => *existing = desc,
            None => self.connections.push(desc),
        }
        Ok(self)
    }

    /// Remove the connection with `label`. The last connection cannot be removed.
    pub fn without_connection(mut self, label: &str) -> Result<Self> {
        let before = self.connections.len();
        self.connections.retain(|c| c.label != label);
        if self.connections.len() == before {
            return Err(LazyAdminError::config(format!("no connection labeled {label:?}")));
        }
        if self.connections.is_empty() {
            return Err(LazyAdminError::config("cannot remove the last connection"));
        }
        Ok(self)
    }

    /// Add a saved view, or replace the one with the same title.
    pub fn with_view(mut self, view: SavedView) -> Result<Self> {
        if view.title.trim().is_empty() || view.query.trim().is_empty() {
            return Err(LazyAdminError::validation("a view needs a title and a query"));
        }
        match self.views.iter_mut().find(|v| v.title == view.title) {
            Some(existing) => *existing = view,
            None => self.views.push(view),
        }
        Ok(self)
    }
}

/// Default config path: the working-directory file if present, otherwise
/// the per-user config directory.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|d| d.join("lazyadmin").join("config.json"))
        .unwrap_or(local)
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_json(
            r#"{
                "project_name": "shop",
                "connections": [
                    { "driver": "postgresql", "host": "db", "user": "app", "name": "main" },
                    { "driver": "mysql", "host": "db", "user": "app",
                      "ssh": { "host": "bastion", "user": "ops", "password": "pw" } },
                    { "label": "local", "driver": "sqlite3", "path": "app.db" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.connections[0].port, 5432);
        assert_eq!(config.connections[0].label, "Connection 1");
        assert_eq!(config.connections[1].port, 3306);
        assert_eq!(config.connections[1].ssh.as_ref().unwrap().port, 22);
        assert_eq!(config.connections[2].label, "local");
        assert_eq!(config.connections[2].driver, Dialect::Sqlite);
        assert_eq!(config.connections[2].port, 0);
    }

    #[test]
    fn test_legacy_database_promoted() {
        let config = AppConfig::from_json(
            r#"{ "database": { "driver": "sqlite", "path": "legacy.db" } }"#,
        )
        .unwrap();
        assert_eq!(config.connections.len(), 1);
        assert_eq!(config.connections[0].label, "Default");
        assert!(config.database.is_none());
    }

    #[test]
    fn test_rejects_empty_and_unknown_driver() {
        let err = AppConfig::from_json(r#"{ "project_name": "x" }"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = AppConfig::from_json(r#"{ "connections": [ { "driver": "oracle" } ] }"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err =
            AppConfig::from_json(r#"{ "connections": [ { "driver": "postgres", "user": "u" } ] }"#)
                .unwrap_err();
        assert!(err.to_string().contains("connection 1"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lazyadmin.json");

        let config = AppConfig::from_json(
            r#"{ "connections": [ { "label": "local", "driver": "sqlite", "path": "a.db" } ] }"#,
        )
        .unwrap()
        .with_view(SavedView {
            title: "Recent".into(),
            description: String::new(),
            query: "SELECT 1".into(),
        })
        .unwrap();
        config.save(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.connections[0].label, "local");
        assert_eq!(reloaded.views, config.views);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("\"database\""));
    }

    #[test]
    fn test_mutations_return_new_value() {
        let config = AppConfig::from_json(
            r#"{ "connections": [ { "label": "a", "driver": "sqlite", "path": "a.db" } ] }"#,
        )
        .unwrap();

        let config = config
            .with_connection(ConnectionDescriptor::mysql("db", "app", "pw", "shop"))
            .unwrap();
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[1].label, "Connection 2");
        assert_eq!(config.connections[1].port, 3306);

        let config = config
            .with_connection(ConnectionDescriptor::sqlite("b.db").with_label("a"))
            .unwrap();
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connection("a").unwrap().sqlite_path(), Some(PathBuf::from("b.db")));

        let config = config.without_connection("a").unwrap();
        assert_eq!(config.connections.len(), 1);
        assert!(config.clone().without_connection("missing").is_err());
        assert!(config.without_connection("Connection 2").is_err());
    }

    #[test]
    fn test_with_view_validates() {
        let config = AppConfig::default();
        let err = config
            .with_view(SavedView { title: "".into(), description: "".into(), query: "".into() })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
