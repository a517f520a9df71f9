//! Structured logging setup with console and file output.
//!
//! Provides:
//! - Daily rotating log files under the user data directory
//! - Build-type conditional log levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via LAZYADMIN_LOG or RUST_LOG
//!
//! Console output goes to stderr so that it never interleaves with table
//! output on stdout.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive.
pub const LOG_ENV_VAR: &str = "LAZYADMIN_LOG";

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stderr is a terminal (enables ANSI colors)
    pub is_tty: bool,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_tty: atty::is(atty::Stream::Stderr) }
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If file logging initialization fails, falls back to console-only.
/// Calling this twice keeps the first subscriber.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_console_logging(&config)
        }
    }
}

/// Initialize stderr-only logging.
fn init_console_logging(config: &LogConfig) -> LoggingGuard {
    let env_filter = build_env_filter();

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .with_ansi(config.is_tty)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();

    LoggingGuard { _worker_guard: None }
}

/// Initialize file + console logging.
fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("lazyadmin")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Only warnings reach the terminal; the file gets everything the filter allows
    let console = std::io::stderr.with_max_level(tracing::Level::WARN);
    let combined = console.and(non_blocking);

    let env_filter = build_env_filter();

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()?;

    Ok(guard)
}

/// Build the filter from LAZYADMIN_LOG, then RUST_LOG, then the default.
fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,lazyadmin=trace,lazyadmin_core=trace,tokio_postgres=warn,sqlx=warn,russh=info"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,lazyadmin=info,lazyadmin_core=info,tokio_postgres=warn,sqlx=warn,russh=warn"
    }
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("lazyadmin")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_namespaced() {
        let dir = log_dir();
        assert!(dir.ends_with("lazyadmin/logs"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(default_log_filter()).is_ok());
    }

    #[test]
    fn test_env_filter_always_builds() {
        assert!(!build_env_filter().to_string().is_empty());
    }
}
