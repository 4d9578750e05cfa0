//! Content-addressed vault for accepted capability source.
//!
//! Records are keyed by the SHA-256 of the exact source bytes, so identical
//! source always lands on the same record no matter which instruction
//! produced it. Writes are idempotent inserts inside a transaction; reads
//! bump `last_used_at` as a side effect, writes never do.

use crate::core::db;
use crate::core::error::CapsmithError;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRecord {
    pub hash: String,
    pub source: String,
    pub dependency_tags: Vec<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

pub struct CapabilityStore {
    conn: Mutex<Connection>,
}

impl CapabilityStore {
    pub fn open(root: &Path) -> Result<Self, CapsmithError> {
        db::initialize_workspace_db(root)?;
        let conn = db::db_connect(&db::workspace_db_path(root).to_string_lossy())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// SHA-256 hex digest of the exact source text.
    pub fn content_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Idempotent insert: returns the content hash whether or not a record
    /// already existed. An existing record is left untouched.
    pub fn store(&self, source: &str, tags: &[String]) -> Result<String, CapsmithError> {
        let hash = Self::content_hash(source);
        let tags_column = if tags.is_empty() {
            None
        } else {
            Some(tags.join(","))
        };
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO capability_vault (hash, source, dependency_tags, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![hash, source, tags_column, time::now_epoch_z()],
        )?;
        tx.commit()?;
        Ok(hash)
    }

    /// Fetch a record; a hit updates `last_used_at` before returning. A
    /// miss is an explicit `None`, never a default.
    pub fn retrieve(&self, hash: &str) -> Result<Option<CapabilityRecord>, CapsmithError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let row = tx
            .query_row(
                "SELECT source, dependency_tags, created_at FROM capability_vault WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((source, tags_column, created_at)) = row else {
            return Ok(None);
        };
        let now = time::now_epoch_z();
        tx.execute(
            "UPDATE capability_vault SET last_used_at = ?1 WHERE hash = ?2",
            params![now, hash],
        )?;
        tx.commit()?;
        Ok(Some(CapabilityRecord {
            hash: hash.to_string(),
            source,
            dependency_tags: split_tags(tags_column.as_deref()),
            created_at,
            last_used_at: Some(now),
        }))
    }

    pub fn exists(&self, hash: &str) -> Result<bool, CapsmithError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM capability_vault WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All records in creation order. Maintenance surface; does not bump
    /// `last_used_at`.
    pub fn list(&self) -> Result<Vec<CapabilityRecord>, CapsmithError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT hash, source, dependency_tags, created_at, last_used_at
             FROM capability_vault ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CapabilityRecord {
                hash: row.get(0)?,
                source: row.get(1)?,
                dependency_tags: split_tags(row.get::<_, Option<String>>(2)?.as_deref()),
                created_at: row.get(3)?,
                last_used_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn purge(&self, hash: &str) -> Result<bool, CapsmithError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM capability_vault WHERE hash = ?1",
            params![hash],
        )?;
        Ok(removed > 0)
    }
}

fn split_tags(column: Option<&str>) -> Vec<String> {
    match column {
        None | Some("") => Vec::new(),
        Some(joined) => joined.split(',').map(String::from).collect(),
    }
}
