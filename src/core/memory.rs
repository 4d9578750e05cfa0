//! Intent memory: the durable record of what an instruction means.
//!
//! Keyed by the normalized prompt. Inserts are write-once: an existing
//! entry is never overwritten, so repeated teaching of the same prompt is
//! idempotent and the first meaning sticks.

use crate::core::db;
use crate::core::error::CapsmithError;
use crate::core::spec::IntentSpec;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

pub struct IntentMemory {
    conn: Mutex<Connection>,
}

impl IntentMemory {
    pub fn open(root: &Path) -> Result<Self, CapsmithError> {
        db::initialize_workspace_db(root)?;
        let conn = db::db_connect(&db::workspace_db_path(root).to_string_lossy())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Exact lookup by normalized prompt.
    pub fn lookup(&self, normalized: &str) -> Result<Option<IntentSpec>, CapsmithError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, args, body FROM intent_memory WHERE prompt = ?1",
                params![normalized],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((name, args_json, body_json)) => {
                let args: Vec<String> = serde_json::from_str(&args_json)
                    .map_err(|e| CapsmithError::StorageFailure(format!("bad args column: {e}")))?;
                let body: Vec<String> = serde_json::from_str(&body_json)
                    .map_err(|e| CapsmithError::StorageFailure(format!("bad body column: {e}")))?;
                Ok(Some(IntentSpec { name, args, body }))
            }
        }
    }

    /// Write-once insert. Returns true if the entry was new, false if an
    /// entry already existed (which is left untouched).
    pub fn insert_if_absent(
        &self,
        normalized: &str,
        spec: &IntentSpec,
    ) -> Result<bool, CapsmithError> {
        let args_json = serde_json::to_string(&spec.args)
            .map_err(|e| CapsmithError::StorageFailure(e.to_string()))?;
        let body_json = serde_json::to_string(&spec.body)
            .map_err(|e| CapsmithError::StorageFailure(e.to_string()))?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO intent_memory (prompt, name, args, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![normalized, spec.name, args_json, body_json, time::now_epoch_z()],
        )?;
        tx.commit()?;
        Ok(inserted > 0)
    }

    /// All stored prompts, in insertion order. The semantic matcher's
    /// working set.
    pub fn prompts(&self) -> Result<Vec<String>, CapsmithError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT prompt FROM intent_memory ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn entries(&self) -> Result<Vec<(String, IntentSpec)>, CapsmithError> {
        let prompts = self.prompts()?;
        let mut out = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            if let Some(spec) = self.lookup(&prompt)? {
                out.push((prompt, spec));
            }
        }
        Ok(out)
    }

    pub fn forget(&self, normalized: &str) -> Result<bool, CapsmithError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM intent_memory WHERE prompt = ?1",
            params![normalized],
        )?;
        Ok(removed > 0)
    }
}
