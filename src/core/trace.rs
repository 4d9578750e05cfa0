//! Append-only run event log.
//!
//! Every orchestrator stage transition lands here as one JSON line, so a
//! failed run can be reconstructed without a debugger attached to the agent.

use crate::core::db;
use crate::core::error::CapsmithError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunEvent {
    pub ts: String,
    pub event_id: String,
    pub run_id: String,
    pub stage: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Records orchestrator stage events for one workspace.
pub struct RunRecorder {
    log_path: PathBuf,
}

impl RunRecorder {
    pub fn new(root: &Path) -> Self {
        Self {
            log_path: db::run_events_path(root),
        }
    }

    pub fn record(
        &self,
        run_id: &str,
        stage: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<(), CapsmithError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = RunEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            status: status.to_string(),
            detail: detail.map(|s| s.to_string()),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(CapsmithError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(&ev).unwrap()).map_err(CapsmithError::IoError)?;
        Ok(())
    }

    /// Read back all recorded events, skipping unparseable lines.
    pub fn events(&self) -> Result<Vec<RunEvent>, CapsmithError> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.log_path).map_err(CapsmithError::IoError)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<RunEvent>(line).ok())
            .collect())
    }
}
