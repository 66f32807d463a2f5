// ABOUTME: Per-task state machine with attempt-scoped flags and append-only history
// ABOUTME: Tracks started/ready/completed/skipped/failed/permanently-failed/terminated

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The labels recorded in a task's status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Started,
    Ready,
    Completed,
    Skipped,
    Failed,
    PermanentlyFailed,
    Terminated,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Started => write!(f, "started"),
            TaskState::Ready => write!(f, "ready"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Skipped => write!(f, "skipped"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::PermanentlyFailed => write!(f, "permanently_failed"),
            TaskState::Terminated => write!(f, "terminated"),
        }
    }
}

/// One history entry: a state transition and when it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: TaskState,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of a status, used for state-log snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_started: bool,
    pub is_ready: bool,
    pub is_completed: bool,
    pub is_skipped: bool,
    pub is_failed: bool,
    pub is_permanently_failed: bool,
    pub is_terminated: bool,
    pub history: Vec<StatusRecord>,
}

/// A task's lifecycle status within one session.
///
/// This is a shared handle: the session and the scheduler observe the
/// same underlying state. Attempt-scoped flags are cleared by `reset`;
/// the history is append-only and survives resets.
#[derive(Clone)]
pub struct TaskStatus {
    inner: Arc<Mutex<StatusInner>>,
}

#[derive(Default)]
struct StatusInner {
    started: bool,
    ready: bool,
    completed: bool,
    skipped: bool,
    failed: bool,
    permanently_failed: bool,
    terminated: bool,
    history: Vec<StatusRecord>,
}

impl TaskStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusInner::default())),
        }
    }

    fn record(inner: &mut StatusInner, state: TaskState) {
        inner.history.push(StatusRecord {
            state,
            at: Utc::now(),
        });
    }

    /// Start a new attempt. Clears the per-attempt failure flag.
    pub fn mark_as_started(&self) {
        let mut inner = self.lock();
        inner.started = true;
        inner.failed = false;
        Self::record(&mut inner, TaskState::Started);
    }

    pub fn mark_as_ready(&self) {
        let mut inner = self.lock();
        if !inner.ready {
            inner.ready = true;
            Self::record(&mut inner, TaskState::Ready);
        }
    }

    pub fn mark_as_completed(&self) {
        let mut inner = self.lock();
        inner.completed = true;
        Self::record(&mut inner, TaskState::Completed);
    }

    pub fn mark_as_skipped(&self) {
        let mut inner = self.lock();
        inner.skipped = true;
        Self::record(&mut inner, TaskState::Skipped);
    }

    pub fn mark_as_failed(&self) {
        let mut inner = self.lock();
        inner.failed = true;
        Self::record(&mut inner, TaskState::Failed);
    }

    pub fn mark_as_permanently_failed(&self) {
        let mut inner = self.lock();
        inner.permanently_failed = true;
        Self::record(&mut inner, TaskState::PermanentlyFailed);
    }

    pub fn mark_as_terminated(&self) {
        let mut inner = self.lock();
        if !inner.terminated {
            inner.terminated = true;
            Self::record(&mut inner, TaskState::Terminated);
        }
    }

    /// Clear attempt-scoped flags so the task can run again.
    /// History and termination are preserved.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.started = false;
        inner.ready = false;
        inner.completed = false;
        inner.skipped = false;
        inner.failed = false;
        inner.permanently_failed = false;
    }

    pub fn reset_history(&self) {
        self.lock().history.clear();
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    pub fn is_skipped(&self) -> bool {
        self.lock().skipped
    }

    pub fn is_failed(&self) -> bool {
        self.lock().failed
    }

    pub fn is_permanently_failed(&self) -> bool {
        self.lock().permanently_failed
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Whether the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        let inner = self.lock();
        inner.completed || inner.skipped || inner.permanently_failed || inner.terminated
    }

    /// Whether downstream tasks may start.
    ///
    /// Tasks gated by readiness checks unlock their downstreams at
    /// READY; ordinary tasks are marked ready on completion, so for
    /// them this is equivalent to completed-or-skipped.
    pub fn allow_run_downstream(&self) -> bool {
        let inner = self.lock();
        inner.ready || inner.completed || inner.skipped
    }

    pub fn history(&self) -> Vec<StatusRecord> {
        self.lock().history.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            is_started: inner.started,
            is_ready: inner.ready,
            is_completed: inner.completed,
            is_skipped: inner.skipped,
            is_failed: inner.failed,
            is_permanently_failed: inner.permanently_failed,
            is_terminated: inner.terminated,
            history: inner.history.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        self.inner.lock().expect("status lock poisoned")
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("TaskStatus")
            .field("started", &snapshot.is_started)
            .field("ready", &snapshot.is_ready)
            .field("completed", &snapshot.is_completed)
            .field("skipped", &snapshot.is_skipped)
            .field("failed", &snapshot.is_failed)
            .field("permanently_failed", &snapshot.is_permanently_failed)
            .field("terminated", &snapshot.is_terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_implies_started_flow() {
        let status = TaskStatus::new();
        assert!(!status.is_started());

        status.mark_as_started();
        status.mark_as_completed();
        status.mark_as_ready();

        assert!(status.is_started());
        assert!(status.is_completed());
        assert!(status.allow_run_downstream());
        assert!(status.is_finished());
    }

    #[test]
    fn test_failed_is_cleared_per_attempt() {
        let status = TaskStatus::new();
        status.mark_as_started();
        status.mark_as_failed();
        assert!(status.is_failed());

        status.mark_as_started();
        assert!(!status.is_failed());
    }

    #[test]
    fn test_skipped_allows_downstream() {
        let status = TaskStatus::new();
        status.mark_as_skipped();
        assert!(status.allow_run_downstream());
        assert!(!status.is_started());
    }

    #[test]
    fn test_permanent_failure_blocks_downstream() {
        let status = TaskStatus::new();
        status.mark_as_started();
        status.mark_as_failed();
        status.mark_as_permanently_failed();
        assert!(!status.allow_run_downstream());
        assert!(status.is_finished());
    }

    #[test]
    fn test_reset_preserves_history() {
        let status = TaskStatus::new();
        status.mark_as_started();
        status.mark_as_completed();
        let history_len = status.history().len();

        status.reset();
        assert!(!status.is_started());
        assert!(!status.is_completed());
        assert_eq!(status.history().len(), history_len);
    }

    #[test]
    fn test_history_records_transitions_in_order() {
        let status = TaskStatus::new();
        status.mark_as_started();
        status.mark_as_failed();
        status.mark_as_started();
        status.mark_as_completed();

        let states: Vec<TaskState> = status.history().iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                TaskState::Started,
                TaskState::Failed,
                TaskState::Started,
                TaskState::Completed,
            ]
        );
    }

    #[test]
    fn test_terminated_recorded_once() {
        let status = TaskStatus::new();
        status.mark_as_terminated();
        status.mark_as_terminated();
        assert_eq!(status.history().len(), 1);
    }
}
