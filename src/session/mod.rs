// ABOUTME: Runtime owner of one DAG execution: registry, statuses, deferred coroutines
// ABOUTME: Tracks downstream adjacency, termination, and state-log snapshots

pub mod state_log;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::context::{Context, SharedContext};
use crate::engine::error::{ExecutionError, Result};
use crate::task::{Group, Task, TaskStatus};

pub use state_log::{
    FileStateLogger, HistoryLog, NullStateLogger, SessionStateLog, StateLogger, TaskStatusLog,
};

/// Display colors cycled over registered tasks that do not pick their own.
const TASK_COLORS: [u8; 8] = [36, 71, 99, 133, 172, 37, 68, 134];

/// Display icons cycled alongside the colors.
const TASK_ICONS: [&str; 8] = ["⚙", "🔨", "📦", "🚀", "🔧", "🪵", "🧪", "📡"];

/// In-memory owner of one execution.
///
/// Sessions are shared handles; clones observe the same run. All
/// mutation happens from the event loop driving the run, so the
/// internal locks are only ever held briefly and never across awaits.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    name: String,
    shared_ctx: SharedContext,
    state_logger: Arc<dyn StateLogger>,
    root_group: Option<Group>,
    started_at: DateTime<Utc>,
    registry: Mutex<Registry>,
    deferred: Mutex<Deferred>,
    abort_handles: Mutex<Vec<AbortHandle>>,
    main_task: Mutex<Option<Task>>,
    terminated: AtomicBool,
}

#[derive(Default)]
struct Registry {
    tasks: IndexMap<String, Task>,
    downstreams: IndexMap<String, Vec<String>>,
    statuses: IndexMap<String, TaskStatus>,
    contexts: HashMap<String, Context>,
    claimed: HashSet<String>,
    next_style: usize,
}

#[derive(Default)]
struct Deferred {
    monitoring: Vec<JoinHandle<()>>,
    actions: Vec<JoinHandle<Result<JsonValue>>>,
    misc: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(shared_ctx: SharedContext) -> Self {
        let name = format!("session-{}", &Uuid::new_v4().simple().to_string()[..10]);
        let session = Self {
            inner: Arc::new(SessionInner {
                name,
                shared_ctx: shared_ctx.clone(),
                state_logger: Arc::new(NullStateLogger),
                root_group: None,
                started_at: Utc::now(),
                registry: Mutex::new(Registry::default()),
                deferred: Mutex::new(Deferred::default()),
                abort_handles: Mutex::new(Vec::new()),
                main_task: Mutex::new(None),
                terminated: AtomicBool::new(false),
            }),
        };
        shared_ctx.set_session(&session);
        session
    }

    pub fn with_state_logger(self, state_logger: Arc<dyn StateLogger>) -> Self {
        // Sessions are built before any clone escapes, so the Arc is unique here.
        let mut inner = Arc::into_inner(self.inner).expect("session already shared");
        inner.state_logger = state_logger;
        let session = Self {
            inner: Arc::new(inner),
        };
        session.inner.shared_ctx.set_session(&session);
        session
    }

    pub fn with_root_group(self, root_group: Group) -> Self {
        let mut inner = Arc::into_inner(self.inner).expect("session already shared");
        inner.root_group = Some(root_group);
        let session = Self {
            inner: Arc::new(inner),
        };
        session.inner.shared_ctx.set_session(&session);
        session
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn shared_ctx(&self) -> &SharedContext {
        &self.inner.shared_ctx
    }

    pub fn state_logger(&self) -> Arc<dyn StateLogger> {
        Arc::clone(&self.inner.state_logger)
    }

    pub fn root_group(&self) -> Option<&Group> {
        self.inner.root_group.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.registry().tasks.keys().cloned().collect()
    }

    pub fn get_task(&self, name: &str) -> Option<Task> {
        self.registry().tasks.get(name).cloned()
    }

    /// Register a task and everything reachable from it through
    /// readiness checks, successors, fallbacks, and upstreams; build
    /// the reverse (downstream) adjacency along the way.
    pub fn register_task(&self, task: &Task) -> Result<()> {
        {
            let mut registry = self.registry();
            if let Some(existing) = registry.tasks.get(task.name()) {
                if existing == task {
                    return Ok(());
                }
                return Err(ExecutionError::usage(format!(
                    "two distinct tasks registered under the name {:?}",
                    task.name()
                )));
            }
            registry.tasks.insert(task.name().to_string(), task.clone());
            registry
                .statuses
                .insert(task.name().to_string(), TaskStatus::new());
        }
        self.inner.shared_ctx.xcom(task.name());

        for check in task.readiness_checks() {
            self.register_task(&check)?;
        }
        for successor in task.successors() {
            self.register_task(&successor)?;
        }
        for fallback in task.fallbacks() {
            self.register_task(&fallback)?;
        }
        for upstream in task.upstreams() {
            self.register_task(&upstream)?;
        }

        let mut registry = self.registry();
        for upstream in task.upstreams() {
            let downstreams = registry
                .downstreams
                .entry(upstream.name().to_string())
                .or_default();
            if !downstreams.iter().any(|name| name == task.name()) {
                downstreams.push(task.name().to_string());
            }
        }
        Ok(())
    }

    /// The status handle for a task, allocated lazily so dynamically
    /// discovered nodes still participate.
    pub fn get_task_status(&self, task: &Task) -> TaskStatus {
        if !self.registry().tasks.contains_key(task.name()) {
            if let Err(e) = self.register_task(task) {
                tracing::warn!(task = %task.name(), "late registration failed: {e}");
            }
        }
        let mut registry = self.registry();
        registry
            .statuses
            .entry(task.name().to_string())
            .or_insert_with(TaskStatus::new)
            .clone()
    }

    /// The per-task context view, created on first reference. Every
    /// context observes the same shared context instance.
    pub fn get_ctx(&self, task: &Task) -> Context {
        let mut registry = self.registry();
        if let Some(ctx) = registry.contexts.get(task.name()) {
            return ctx.clone();
        }
        let style = registry.next_style;
        registry.next_style += 1;
        let color = task
            .color()
            .unwrap_or(TASK_COLORS[style % TASK_COLORS.len()]);
        let icon = task
            .icon()
            .map(str::to_string)
            .unwrap_or_else(|| TASK_ICONS[style % TASK_ICONS.len()].to_string());
        let ctx = Context::new(self.inner.shared_ctx.clone(), task.name(), color, icon);
        registry.contexts.insert(task.name().to_string(), ctx.clone());
        ctx
    }

    /// Roots (tasks with no upstreams) of the upstream closure of `task`.
    pub fn get_root_tasks(&self, task: &Task) -> Vec<Task> {
        let mut roots = Vec::new();
        let mut visited = HashSet::new();
        collect_roots(task, &mut roots, &mut visited);
        roots
    }

    /// The registered downstream set of `task` within this session.
    pub fn get_next_tasks(&self, task: &Task) -> Vec<Task> {
        let registry = self.registry();
        registry
            .downstreams
            .get(task.name())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| registry.tasks.get(name).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A task may run iff the session is live, the task has not started
    /// or completed, and every upstream allows downstream execution.
    pub fn is_allowed_to_run(&self, task: &Task) -> bool {
        if self.is_terminated() {
            return false;
        }
        let status = self.get_task_status(task);
        if status.is_started() || status.is_completed() {
            return false;
        }
        task.upstreams()
            .iter()
            .all(|upstream| self.get_task_status(upstream).allow_run_downstream())
    }

    /// Atomically check `is_allowed_to_run` and claim the task for
    /// execution, so a node reachable via multiple paths runs once.
    pub(crate) fn try_claim(&self, task: &Task) -> bool {
        if !self.is_allowed_to_run(task) {
            return false;
        }
        self.registry().claimed.insert(task.name().to_string())
    }

    /// Release a claim so a reset task can run through the chain again.
    pub(crate) fn release_claim(&self, task: &Task) {
        self.registry().claimed.remove(task.name());
    }

    pub fn defer_action(&self, task: &Task, handle: JoinHandle<Result<JsonValue>>) {
        tracing::debug!(task = %task.name(), "deferring action coroutine");
        self.track_abort(handle.abort_handle());
        self.deferred().actions.push(handle);
    }

    pub fn defer_monitoring(&self, task: &Task, handle: JoinHandle<()>) {
        tracing::debug!(task = %task.name(), "deferring monitoring coroutine");
        self.track_abort(handle.abort_handle());
        self.deferred().monitoring.push(handle);
    }

    pub fn defer_coro(&self, handle: JoinHandle<()>) {
        self.track_abort(handle.abort_handle());
        self.deferred().misc.push(handle);
    }

    /// Await deferred coroutines: monitoring first, then actions, then
    /// misc. Coroutines deferred while waiting (e.g. restarts issued by
    /// a monitor) are picked up on the next pass.
    pub async fn wait_deferred(&self) -> Result<()> {
        let mut first_error: Option<ExecutionError> = None;
        loop {
            let (monitoring, actions, misc) = {
                let mut deferred = self.deferred();
                (
                    std::mem::take(&mut deferred.monitoring),
                    std::mem::take(&mut deferred.actions),
                    std::mem::take(&mut deferred.misc),
                )
            };
            if monitoring.is_empty() && actions.is_empty() && misc.is_empty() {
                break;
            }
            for handle in monitoring {
                join_quietly(handle).await?;
            }
            for handle in actions {
                match handle.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => return Err(e.into()),
                }
            }
            for handle in misc {
                join_quietly(handle).await?;
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Idempotent. Marks every tracked status terminated and cancels
    /// every tracked coroutine.
    pub fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(session = %self.inner.name, "terminating session");
        for status in self.registry().statuses.values() {
            status.mark_as_terminated();
        }
        for handle in self
            .inner
            .abort_handles
            .lock()
            .expect("abort handles lock poisoned")
            .drain(..)
        {
            handle.abort();
        }
    }

    pub fn set_main_task(&self, task: &Task) -> Result<()> {
        self.register_task(task)?;
        *self.inner.main_task.lock().expect("main task lock poisoned") = Some(task.clone());
        Ok(())
    }

    pub fn main_task(&self) -> Option<Task> {
        self.inner
            .main_task
            .lock()
            .expect("main task lock poisoned")
            .clone()
    }

    /// The main task's result: a peek of its xcom slot.
    pub fn final_result(&self) -> Result<JsonValue> {
        let main = self.main_task().ok_or_else(|| {
            ExecutionError::usage("session has no main task; nothing was run")
        })?;
        Ok(self.inner.shared_ctx.xcom(main.name()).peek()?)
    }

    /// The main task's path in the group tree, used for state logs.
    pub fn task_path(&self) -> Vec<String> {
        let Some(main) = self.main_task() else {
            return Vec::new();
        };
        if let Some(group) = &self.inner.root_group {
            if let Some(path) = group.find_task_path(main.name()) {
                return path;
            }
        }
        vec![main.name().to_string()]
    }

    pub fn as_state_log(&self) -> SessionStateLog {
        let main_task_name = self
            .main_task()
            .map(|task| task.name().to_string())
            .unwrap_or_default();
        let task_status: IndexMap<String, TaskStatusLog> = self
            .registry()
            .statuses
            .iter()
            .map(|(name, status)| (name.clone(), status.snapshot().into()))
            .collect();
        let final_result = self
            .final_result()
            .map(|value| json_to_display(&value))
            .unwrap_or_default();
        SessionStateLog {
            name: self.inner.name.clone(),
            main_task_name,
            path: self.task_path(),
            start_time: state_log::format_timestamp(self.inner.started_at),
            task_status,
            log: self.inner.shared_ctx.shared_log(),
            input: self.inner.shared_ctx.inputs(),
            final_result,
            is_terminated: self.is_terminated(),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.registry.lock().expect("registry lock poisoned")
    }

    fn deferred(&self) -> std::sync::MutexGuard<'_, Deferred> {
        self.inner.deferred.lock().expect("deferred lock poisoned")
    }

    fn track_abort(&self, handle: AbortHandle) {
        self.inner
            .abort_handles
            .lock()
            .expect("abort handles lock poisoned")
            .push(handle);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.inner.name)
            .field("tasks", &self.task_names())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

fn collect_roots(task: &Task, roots: &mut Vec<Task>, visited: &mut HashSet<String>) {
    if !visited.insert(task.name().to_string()) {
        return;
    }
    let upstreams = task.upstreams();
    if upstreams.is_empty() {
        if !roots.iter().any(|root| root == task) {
            roots.push(task.clone());
        }
        return;
    }
    for upstream in upstreams {
        collect_roots(&upstream, roots, visited);
    }
}

async fn join_quietly(handle: JoinHandle<()>) -> Result<()> {
    match handle.await {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn json_to_display(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
