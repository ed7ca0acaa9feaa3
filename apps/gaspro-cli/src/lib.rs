//! # GasPro CLI Library
//!
//! ## Module Organization
//! ```text
//! gaspro_cli/
//! ├── lib.rs          ◄─── You are here (startup & run)
//! ├── cli.rs          ◄─── clap definitions and value parsers
//! ├── state.rs        ◄─── AppState (Database + SyncAgent)
//! ├── commands/       ◄─── One module per command group
//! └── error.rs        ◄─── CliError, printed as JSON
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Command Lifecycle                               │
//! │                                                                         │
//! │  1. Initialize logging (stderr) ─────────────────────────────────────► │
//! │     • Default: info,gaspro=debug,sqlx=warn; RUST_LOG overrides         │
//! │                                                                         │
//! │  2. Resolve database path ───────────────────────────────────────────► │
//! │     • --db, then GASPRO_DB_PATH, then the platform data dir            │
//! │                                                                         │
//! │  3. Open database, run migrations ───────────────────────────────────► │
//! │                                                                         │
//! │  4. Load sync.toml (+ GASPRO_* env) and build the sync agent ────────► │
//! │                                                                         │
//! │  5. reconcile_all(), then start the agent ───────────────────────────► │
//! │                                                                         │
//! │  6. Run the command, print JSON on stdout ───────────────────────────► │
//! │                                                                         │
//! │  7. Flush pending changes (online only), stop the agent ─────────────► │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use directories::ProjectDirs;
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gaspro_db::{Database, DbConfig};
use gaspro_sync::SyncConfig;

use cli::Cli;
use error::{CliError, CliResult};
use state::AppState;

/// Parses arguments, runs one command and prints its result.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match execute(cli).await {
        Ok(value) => {
            print_json(&value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_json(&json!({ "error": err }));
            ExitCode::from(err.exit_code())
        }
    }
}

async fn execute(cli: Cli) -> CliResult<Value> {
    let db_path = database_path(cli.db)?;
    info!(?db_path, "Database path determined");

    let db = Database::new(DbConfig::new(db_path)).await?;
    let config = SyncConfig::load(cli.config)?;
    debug!(mode = %config.mode(), device_id = %config.device_id(), "Sync configuration loaded");

    let mut state = AppState::new(db, config)?;
    state.start().await?;

    let result = commands::dispatch(&state, cli.command).await;
    state.finish().await;
    result
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render output: {}", e),
    }
}

/// Initializes the tracing subscriber. Logs go to stderr so stdout carries
/// only the JSON result.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=gaspro=trace` - Show trace for gaspro crates only
/// - Default: `info,gaspro=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gaspro=debug,sqlx=warn"));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Determines the database file path.
///
/// ## Platform-Specific Paths
/// - **macOS**: `~/Library/Application Support/com.gaspro.gaspro/gaspro.db`
/// - **Windows**: `%APPDATA%\gaspro\gaspro\data\gaspro.db`
/// - **Linux**: `~/.local/share/gaspro/gaspro.db`
///
/// `--db` (or `GASPRO_DB_PATH`, read by clap) takes precedence.
fn database_path(flag: Option<PathBuf>) -> CliResult<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }

    let dirs = ProjectDirs::from("com", "gaspro", "gaspro")
        .ok_or_else(|| CliError::internal("Could not determine app data directory"))?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("gaspro.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = database_path(Some(PathBuf::from("/tmp/x.db"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.db"));
    }

    #[tokio::test]
    async fn test_command_against_file_database() {
        let path = std::env::temp_dir().join(format!(
            "gaspro-cli-{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let cli = Cli::try_parse_from([
            "gaspro",
            "--db",
            path.to_str().unwrap(),
            "--config",
            "/nonexistent/sync.toml",
            "customer",
            "add",
            "Hana",
        ])
        .unwrap();
        let value = execute(cli).await.unwrap();
        assert_eq!(value["serialNumber"], 1);

        let cli = Cli::try_parse_from([
            "gaspro",
            "--db",
            path.to_str().unwrap(),
            "--config",
            "/nonexistent/sync.toml",
            "customer",
            "list",
        ])
        .unwrap();
        let value = execute(cli).await.unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);

        let _ = std::fs::remove_file(&path);
    }
}
