// ABOUTME: Declarative task node: identity, inputs, envs, graph edges, retry and readiness config
// ABOUTME: Node handles are cheap clones; edges can be wired after construction

pub mod action;
pub mod attr;
pub mod cmd;
pub mod env;
pub mod group;
pub mod input;
pub mod status;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::context::Context;
use crate::engine::error::Result;
use crate::engine::lifecycle;
use crate::session::Session;

pub use action::{ActionFn, ActionHook, TaskAction};
pub use attr::{BoolAttr, StrAttr};
pub use cmd::CmdTask;
pub use env::Env;
pub use group::Group;
pub use input::{Input, InputKind};
pub use status::{StatusRecord, StatusSnapshot, TaskState, TaskStatus};

/// Caller-supplied string keyword arguments for a run.
pub type StrKwargs = IndexMap<String, String>;

/// A node in the task graph.
///
/// `Task` is a shared handle: clones refer to the same node, and node
/// identity (for edge deduplication) is handle identity. Edges may be
/// appended after construction, but the graph must be fully wired
/// before the task is run.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    name: String,
    description: Option<String>,
    color: Option<u8>,
    icon: Option<String>,
    inputs: Vec<Input>,
    envs: Vec<Env>,
    edges: RwLock<TaskEdges>,
    retries: usize,
    retry_period: Duration,
    readiness_check_delay: Duration,
    readiness_check_period: Duration,
    readiness_failure_threshold: usize,
    readiness_timeout: Duration,
    monitor_readiness: bool,
    execute_condition: BoolAttr,
    action: TaskAction,
}

#[derive(Default)]
struct TaskEdges {
    upstreams: Vec<Task>,
    fallbacks: Vec<Task>,
    successors: Vec<Task>,
    readiness_checks: Vec<Task>,
}

impl Task {
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        self.inner.description.as_deref().unwrap_or(&self.inner.name)
    }

    pub fn color(&self) -> Option<u8> {
        self.inner.color
    }

    pub fn icon(&self) -> Option<&str> {
        self.inner.icon.as_deref()
    }

    /// Append an upstream edge: this task will not start until `task`
    /// allows downstream execution. Duplicate handles are ignored.
    pub fn append_upstream(&self, task: &Task) {
        Self::append_edge(&mut self.edges_mut().upstreams, task);
    }

    /// Append a fallback: `task` runs iff this task ends permanently failed.
    pub fn append_fallback(&self, task: &Task) {
        Self::append_edge(&mut self.edges_mut().fallbacks, task);
    }

    /// Append a successor: `task` runs after this task completes.
    pub fn append_successor(&self, task: &Task) {
        Self::append_edge(&mut self.edges_mut().successors, task);
    }

    /// Append a readiness check: this task is READY once `task` completes.
    pub fn append_readiness_check(&self, task: &Task) {
        Self::append_edge(&mut self.edges_mut().readiness_checks, task);
    }

    fn append_edge(edges: &mut Vec<Task>, task: &Task) {
        if !edges.iter().any(|existing| existing == task) {
            edges.push(task.clone());
        }
    }

    pub fn upstreams(&self) -> Vec<Task> {
        self.edges().upstreams.clone()
    }

    pub fn fallbacks(&self) -> Vec<Task> {
        self.edges().fallbacks.clone()
    }

    pub fn successors(&self) -> Vec<Task> {
        self.edges().successors.clone()
    }

    pub fn readiness_checks(&self) -> Vec<Task> {
        self.edges().readiness_checks.clone()
    }

    /// Declared inputs unioned over the upstream closure, preserving
    /// first occurrence order and deduplicating by name.
    pub fn inputs(&self) -> Vec<Input> {
        let mut inputs: Vec<Input> = Vec::new();
        for upstream in self.upstreams() {
            combine_by_name(&mut inputs, upstream.inputs(), Input::name);
        }
        combine_by_name(&mut inputs, self.inner.inputs.clone(), Input::name);
        inputs
    }

    /// Declared envs unioned over the upstream closure, preserving
    /// first occurrence order and deduplicating by name.
    pub fn envs(&self) -> Vec<Env> {
        let mut envs: Vec<Env> = Vec::new();
        for upstream in self.upstreams() {
            combine_by_name(&mut envs, upstream.envs(), Env::name);
        }
        combine_by_name(&mut envs, self.inner.envs.clone(), Env::name);
        envs
    }

    /// The per-task context, with this task's envs folded into it.
    pub fn get_ctx(&self, session: &Session) -> Result<Context> {
        let ctx = session.get_ctx(self);
        for env in self.envs() {
            env.update_context(ctx.shared())?;
        }
        Ok(ctx)
    }

    /// Run this task's graph to completion on a fresh current-thread
    /// runtime and return the main task's result.
    pub fn run(&self, kwargs: StrKwargs) -> Result<JsonValue> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(lifecycle::run_and_cleanup(self.clone(), None, kwargs))
    }

    /// Like `run`, but usable from an existing runtime.
    pub async fn async_run(&self, session: Option<Session>, kwargs: StrKwargs) -> Result<JsonValue> {
        lifecycle::run_and_cleanup(self.clone(), session, kwargs).await
    }

    pub(crate) fn retries(&self) -> usize {
        self.inner.retries
    }

    pub(crate) fn retry_period(&self) -> Duration {
        self.inner.retry_period
    }

    pub(crate) fn readiness_check_delay(&self) -> Duration {
        self.inner.readiness_check_delay
    }

    pub(crate) fn readiness_check_period(&self) -> Duration {
        self.inner.readiness_check_period
    }

    pub(crate) fn readiness_failure_threshold(&self) -> usize {
        self.inner.readiness_failure_threshold
    }

    pub(crate) fn readiness_timeout(&self) -> Duration {
        self.inner.readiness_timeout
    }

    pub(crate) fn monitor_readiness(&self) -> bool {
        self.inner.monitor_readiness
    }

    pub(crate) fn execute_condition(&self) -> &BoolAttr {
        &self.inner.execute_condition
    }

    pub(crate) fn action(&self) -> &TaskAction {
        &self.inner.action
    }

    fn edges(&self) -> std::sync::RwLockReadGuard<'_, TaskEdges> {
        self.inner.edges.read().expect("task edges lock poisoned")
    }

    fn edges_mut(&self) -> std::sync::RwLockWriteGuard<'_, TaskEdges> {
        self.inner.edges.write().expect("task edges lock poisoned")
    }
}

fn combine_by_name<T>(existing: &mut Vec<T>, new: Vec<T>, name: impl Fn(&T) -> &str) {
    for item in new {
        if !existing.iter().any(|e| name(e) == name(&item)) {
            existing.push(item);
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let edges = self.edges();
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field(
                "upstreams",
                &edges.upstreams.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .field("retries", &self.inner.retries)
            .finish()
    }
}

/// Builder for task nodes. Every field has a sensible default; only the
/// name is required.
pub struct TaskBuilder {
    name: String,
    description: Option<String>,
    color: Option<u8>,
    icon: Option<String>,
    inputs: Vec<Input>,
    envs: Vec<Env>,
    upstreams: Vec<Task>,
    fallbacks: Vec<Task>,
    successors: Vec<Task>,
    readiness_checks: Vec<Task>,
    retries: usize,
    retry_period: Duration,
    readiness_check_delay: Duration,
    readiness_check_period: Duration,
    readiness_failure_threshold: usize,
    readiness_timeout: Duration,
    monitor_readiness: bool,
    execute_condition: BoolAttr,
    action: TaskAction,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: None,
            icon: None,
            inputs: Vec::new(),
            envs: Vec::new(),
            upstreams: Vec::new(),
            fallbacks: Vec::new(),
            successors: Vec::new(),
            readiness_checks: Vec::new(),
            retries: 2,
            retry_period: Duration::ZERO,
            readiness_check_delay: Duration::from_millis(500),
            readiness_check_period: Duration::from_secs(5),
            readiness_failure_threshold: 1,
            readiness_timeout: Duration::from_secs(60),
            monitor_readiness: false,
            execute_condition: BoolAttr::Value(true),
            action: TaskAction::None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u8) -> Self {
        self.color = Some(color);
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn env(mut self, env: Env) -> Self {
        self.envs.push(env);
        self
    }

    pub fn upstream(mut self, task: &Task) -> Self {
        self.upstreams.push(task.clone());
        self
    }

    pub fn fallback(mut self, task: &Task) -> Self {
        self.fallbacks.push(task.clone());
        self
    }

    pub fn successor(mut self, task: &Task) -> Self {
        self.successors.push(task.clone());
        self
    }

    pub fn readiness_check(mut self, task: &Task) -> Self {
        self.readiness_checks.push(task.clone());
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    pub fn readiness_check_delay(mut self, delay: Duration) -> Self {
        self.readiness_check_delay = delay;
        self
    }

    pub fn readiness_check_period(mut self, period: Duration) -> Self {
        self.readiness_check_period = period;
        self
    }

    pub fn readiness_failure_threshold(mut self, threshold: usize) -> Self {
        self.readiness_failure_threshold = threshold;
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn monitor_readiness(mut self, monitor: bool) -> Self {
        self.monitor_readiness = monitor;
        self
    }

    pub fn execute_condition(mut self, condition: impl Into<BoolAttr>) -> Self {
        self.execute_condition = condition.into();
        self
    }

    /// String action: rendered against the live context and returned as
    /// the task's result.
    pub fn action_template(mut self, template: impl Into<String>) -> Self {
        self.action = TaskAction::Template(template.into());
        self
    }

    /// Async closure action.
    pub fn action_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<JsonValue>> + Send + 'static,
    {
        self.action = TaskAction::func(f);
        self
    }

    pub fn action_hook(mut self, hook: Arc<dyn ActionHook>) -> Self {
        self.action = TaskAction::Hook(hook);
        self
    }

    pub fn build(self) -> Task {
        let task = Task {
            inner: Arc::new(TaskInner {
                name: self.name,
                description: self.description,
                color: self.color,
                icon: self.icon,
                inputs: self.inputs,
                envs: self.envs,
                edges: RwLock::new(TaskEdges::default()),
                retries: self.retries,
                retry_period: self.retry_period,
                readiness_check_delay: self.readiness_check_delay,
                readiness_check_period: self.readiness_check_period,
                readiness_failure_threshold: self.readiness_failure_threshold,
                readiness_timeout: self.readiness_timeout,
                monitor_readiness: self.monitor_readiness,
                execute_condition: self.execute_condition,
                action: self.action,
            }),
        };
        for upstream in &self.upstreams {
            task.append_upstream(upstream);
        }
        for fallback in &self.fallbacks {
            task.append_fallback(fallback);
        }
        for successor in &self.successors {
            task.append_successor(successor);
        }
        for check in &self.readiness_checks {
            task.append_readiness_check(check);
        }
        task
    }
}
