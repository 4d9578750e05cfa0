//! Centralized database schema definitions for capsmith's persistent tables.
//!
//! Capsmith keeps two SQLite tables in one workspace database:
//! 1. capability_vault: content-addressed accepted source records.
//! 2. intent_memory: normalized instruction text mapped to taught specs.

pub const WORKSPACE_DB_NAME: &str = "capsmith.db";

pub const CAPABILITY_VAULT_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS capability_vault (
        hash TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        dependency_tags TEXT,
        created_at TEXT NOT NULL,
        last_used_at TEXT
    )
";

pub const INTENT_MEMORY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS intent_memory (
        prompt TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        args TEXT NOT NULL, -- JSON array of parameter identifiers
        body TEXT NOT NULL, -- JSON array of body lines
        created_at TEXT NOT NULL
    )
";

/// Append-only orchestrator stage log, one JSON object per line.
pub const RUN_EVENTS_LOG_NAME: &str = "runs.events.jsonl";
