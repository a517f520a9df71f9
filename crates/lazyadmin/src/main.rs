//! LazyAdmin - a terminal database browser.
//!
//! Usage: `lazyadmin [CONFIG] [CONNECTION]`
//!
//! Connects to the named connection (or the first one), then prints the table
//! list followed by each saved view. Without saved views the first table is
//! browsed instead.

mod render;

use lazyadmin_core::config::{default_config_path, AppConfig};
use lazyadmin_core::logging::{init_logging, log_dir, LogConfig};
use lazyadmin_core::models::query::DEFAULT_BROWSE_LIMIT;
use lazyadmin_core::{Connection, ConnectionManager, CrudService, LazyAdminError, SchemaService};
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let _logging_guard = init_logging(LogConfig::new(log_dir()));

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(default_config_path);
    let label = args.next();

    tracing::info!(config = %config_path.display(), "Starting LazyAdmin");

    match run(config_path, label.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let info = e.to_error_info();
            eprintln!("{}: {}", info.error_type, info.message);
            if let Some(hint) = info.hint {
                eprintln!("hint: {hint}");
            }
            tracing::error!(error = %e, "LazyAdmin exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: PathBuf, label: Option<&str>) -> Result<(), LazyAdminError> {
    let config = AppConfig::load(&config_path)?;

    let desc = match label {
        Some(label) => config
            .connection(label)
            .ok_or_else(|| LazyAdminError::config(format!("no connection labeled {label:?}")))?,
        // load() rejects configs without connections
        None => config
            .connections
            .first()
            .ok_or_else(|| LazyAdminError::config("no database connections defined"))?,
    };

    if !config.project_name.is_empty() {
        println!("# {}", config.project_name);
    }
    println!("Connecting to {} ({})", desc.label, desc.display_target());

    let conn = ConnectionManager::connect(desc).await?;
    let outcome = browse(&conn, &config).await;
    conn.close().await;
    outcome
}

async fn browse(conn: &Connection, config: &AppConfig) -> Result<(), LazyAdminError> {
    let tables = SchemaService::list_tables(conn).await?;
    println!("\nTables ({}):", tables.len());
    for table in &tables {
        println!("  {}", table.qualified_name());
    }

    if config.views.is_empty() {
        if let Some(first) = tables.first() {
            println!("\n== {} ==", first.qualified_name());
            let result = CrudService::browse(conn, &first.name, DEFAULT_BROWSE_LIMIT).await?;
            print!("{}", render::render_table(&result));
        }
        return Ok(());
    }

    for view in &config.views {
        println!("\n== {} ==", view.title);
        if !view.description.is_empty() {
            println!("{}", view.description);
        }
        // A failing view is reported and the rest still run
        match CrudService::run_query(conn, &view.query).await {
            Ok(result) => print!("{}", render::render_table(&result)),
            Err(e) => {
                tracing::warn!(view = %view.title, error = %e, "Saved view failed");
                println!("error: {e}");
            }
        }
    }
    Ok(())
}
