// ABOUTME: Structured session state snapshots and the state-logger collaborator
// ABOUTME: The engine emits initial, periodic, and final snapshots; durability lives here

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::task::StatusSnapshot;

/// Timestamp format used throughout state logs.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusLog {
    pub is_started: bool,
    pub is_ready: bool,
    pub is_completed: bool,
    pub is_skipped: bool,
    pub is_failed: bool,
    pub is_permanently_failed: bool,
    pub is_terminated: bool,
    pub history: Vec<HistoryLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLog {
    pub state: String,
    pub time: String,
}

impl From<StatusSnapshot> for TaskStatusLog {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            is_started: snapshot.is_started,
            is_ready: snapshot.is_ready,
            is_completed: snapshot.is_completed,
            is_skipped: snapshot.is_skipped,
            is_failed: snapshot.is_failed,
            is_permanently_failed: snapshot.is_permanently_failed,
            is_terminated: snapshot.is_terminated,
            history: snapshot
                .history
                .into_iter()
                .map(|record| HistoryLog {
                    state: record.state.to_string(),
                    time: format_timestamp(record.at),
                })
                .collect(),
        }
    }
}

/// One snapshot of a session's observable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateLog {
    pub name: String,
    pub main_task_name: String,
    pub path: Vec<String>,
    pub start_time: String,
    pub task_status: IndexMap<String, TaskStatusLog>,
    pub log: Vec<String>,
    pub input: IndexMap<String, JsonValue>,
    pub final_result: String,
    pub is_terminated: bool,
}

/// Collaborator that persists session state snapshots.
///
/// The engine writes an initial snapshot, periodic snapshots while the
/// session runs, and a final snapshot on termination. The format is
/// opaque to the engine.
pub trait StateLogger: Send + Sync {
    fn write(&self, log: &SessionStateLog);
}

/// Discards every snapshot. The default collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStateLogger;

impl StateLogger for NullStateLogger {
    fn write(&self, _log: &SessionStateLog) {}
}

/// Writes one JSON document per session under a log directory,
/// overwriting on each snapshot so the file always holds the latest
/// state.
#[derive(Debug, Clone)]
pub struct FileStateLogger {
    session_log_dir: PathBuf,
}

impl FileStateLogger {
    pub fn new(session_log_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_log_dir: session_log_dir.into(),
        }
    }

    pub fn read(&self, session_name: &str) -> std::io::Result<SessionStateLog> {
        let content = std::fs::read_to_string(self.session_file_path(session_name))?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn session_file_path(&self, session_name: &str) -> PathBuf {
        self.session_log_dir.join(format!("{session_name}.json"))
    }
}

impl StateLogger for FileStateLogger {
    fn write(&self, log: &SessionStateLog) {
        let result = std::fs::create_dir_all(&self.session_log_dir).and_then(|_| {
            let content = serde_json::to_string(log)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(self.session_file_path(&log.name), content)
        });
        if let Err(e) = result {
            tracing::warn!(session = %log.name, "failed to write session state log: {e}");
        }
    }
}
