use crate::core::error::CapsmithError;
use crate::core::schemas;
use rusqlite::Connection;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, CapsmithError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(CapsmithError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(CapsmithError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(CapsmithError::RusqliteError)?;
    Ok(conn)
}

pub fn workspace_db_path(root: &Path) -> PathBuf {
    root.join(schemas::WORKSPACE_DB_NAME)
}

pub fn run_events_path(root: &Path) -> PathBuf {
    root.join(schemas::RUN_EVENTS_LOG_NAME)
}

/// Resolve the workspace root: `CAPSMITH_HOME` wins, else `~/.capsmith`.
pub fn default_root() -> Result<PathBuf, CapsmithError> {
    if let Ok(home) = env::var("CAPSMITH_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = env::var("HOME")?;
    Ok(PathBuf::from(home).join(".capsmith"))
}

pub fn initialize_workspace_db(root: &Path) -> Result<(), CapsmithError> {
    fs::create_dir_all(root).map_err(CapsmithError::IoError)?;
    let db_path = workspace_db_path(root);
    let conn = db_connect(&db_path.to_string_lossy())?;
    conn.execute(schemas::CAPABILITY_VAULT_SCHEMA, [])?;
    conn.execute(schemas::INTENT_MEMORY_SCHEMA, [])?;
    Ok(())
}
