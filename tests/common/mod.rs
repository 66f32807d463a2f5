// ABOUTME: Common utilities for engine integration tests
// ABOUTME: Task constructors, a collecting state logger, and history helpers

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};

use weft::task::{TaskState, TaskStatus};
use weft::{SessionStateLog, StateLogger, Task};

/// A task whose action returns a fixed string.
pub fn returning_task(name: &str, value: &str) -> Task {
    let value = value.to_string();
    Task::builder(name)
        .retries(0)
        .action_fn(move |_ctx| {
            let value = value.clone();
            async move { Ok(json!(value)) }
        })
        .build()
}

/// A task whose action fails on the first `failures` attempts and then
/// returns `value`. The counter observes how many attempts ran.
pub fn flaky_task(name: &str, failures: usize, value: JsonValue, counter: Arc<AtomicUsize>) -> Task {
    Task::builder(name)
        .retries(failures)
        .action_fn(move |_ctx| {
            let value = value.clone();
            let counter = Arc::clone(&counter);
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt <= failures {
                    anyhow::bail!("attempt {attempt} failed");
                }
                Ok(value)
            }
        })
        .build()
}

/// A task that always fails.
pub fn failing_task(name: &str, retries: usize, message: &str) -> Task {
    let message = message.to_string();
    Task::builder(name)
        .retries(retries)
        .action_fn(move |_ctx| {
            let message = message.clone();
            async move { Err(anyhow::anyhow!("{message}")) }
        })
        .build()
}

/// First timestamp at which the status entered the given state.
pub fn first_transition(status: &TaskStatus, state: TaskState) -> Option<DateTime<Utc>> {
    status
        .history()
        .iter()
        .find(|record| record.state == state)
        .map(|record| record.at)
}

/// Last timestamp at which the status entered the given state.
pub fn last_transition(status: &TaskStatus, state: TaskState) -> Option<DateTime<Utc>> {
    status
        .history()
        .iter()
        .rev()
        .find(|record| record.state == state)
        .map(|record| record.at)
}

pub fn count_transitions(status: &TaskStatus, state: TaskState) -> usize {
    status
        .history()
        .iter()
        .filter(|record| record.state == state)
        .count()
}

/// State logger that keeps every snapshot in memory.
#[derive(Clone, Default)]
pub struct CollectingStateLogger {
    snapshots: Arc<Mutex<Vec<SessionStateLog>>>,
}

impl CollectingStateLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<SessionStateLog> {
        self.snapshots.lock().expect("snapshots lock poisoned").clone()
    }
}

impl StateLogger for CollectingStateLogger {
    fn write(&self, log: &SessionStateLog) {
        self.snapshots
            .lock()
            .expect("snapshots lock poisoned")
            .push(log.clone());
    }
}
