// ABOUTME: Per-task view over the shared context with display and attempt metadata
// ABOUTME: Provides print/log helpers that prefix the task name and feed the shared log

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Local;
use serde_json::Value as JsonValue;
use tracing::Level;

use crate::template::Result as TemplateResult;

use super::shared::SharedContext;
use super::xcom::Xcom;

/// A task-scoped projection of the shared context.
///
/// Every context spawned from one session observes the same shared
/// state; only the task name, display attributes, and attempt counters
/// differ. Clones share the attempt counters.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    shared: SharedContext,
    task_name: String,
    color: u8,
    icon: String,
    attempt: AtomicUsize,
    max_attempt: AtomicUsize,
}

impl Context {
    pub fn new(shared: SharedContext, task_name: impl Into<String>, color: u8, icon: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                shared,
                task_name: task_name.into(),
                color,
                icon: icon.into(),
                attempt: AtomicUsize::new(0),
                max_attempt: AtomicUsize::new(0),
            }),
        }
    }

    pub fn shared(&self) -> &SharedContext {
        &self.inner.shared
    }

    pub fn task_name(&self) -> &str {
        &self.inner.task_name
    }

    pub fn attempt(&self) -> usize {
        self.inner.attempt.load(Ordering::Relaxed)
    }

    pub fn max_attempt(&self) -> usize {
        self.inner.max_attempt.load(Ordering::Relaxed)
    }

    pub fn set_attempt(&self, attempt: usize) {
        self.inner.attempt.store(attempt, Ordering::Relaxed);
    }

    pub fn set_max_attempt(&self, max_attempt: usize) {
        self.inner.max_attempt.store(max_attempt, Ordering::Relaxed);
    }

    pub fn input(&self, name: &str) -> Option<JsonValue> {
        self.inner.shared.get_input(name)
    }

    pub fn env(&self, name: &str) -> Option<String> {
        self.inner.shared.get_env(name)
    }

    pub fn args(&self) -> Vec<JsonValue> {
        self.inner.shared.args()
    }

    /// The xcom slot for any task, created on first reference.
    pub fn xcom(&self, slot: &str) -> Xcom {
        self.inner.shared.xcom(slot)
    }

    pub fn render(&self, template: &str) -> TemplateResult<String> {
        self.inner.shared.render(template)
    }

    pub fn render_bool(&self, template: &str) -> TemplateResult<bool> {
        self.inner.shared.render_bool(template)
    }

    pub fn render_int(&self, template: &str) -> TemplateResult<i64> {
        self.inner.shared.render_int(template)
    }

    pub fn render_float(&self, template: &str) -> TemplateResult<f64> {
        self.inner.shared.render_float(template)
    }

    /// Print a task-prefixed line to stderr and append it to the shared log.
    pub fn print(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = self.format_line(message);
        self.inner.shared.append_to_shared_log(line.clone());
        eprintln!("{}", stylize(self.inner.color, &line));
    }

    pub fn log_debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.enabled(Level::DEBUG) {
            tracing::debug!(task = %self.inner.task_name, attempt = self.attempt(), "{message}");
            self.inner
                .shared
                .append_to_shared_log(self.format_line(&format!("[DEBUG] {message}")));
        }
    }

    pub fn log_info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.enabled(Level::INFO) {
            tracing::info!(task = %self.inner.task_name, attempt = self.attempt(), "{message}");
            self.inner
                .shared
                .append_to_shared_log(self.format_line(&format!("[INFO] {message}")));
        }
    }

    pub fn log_warning(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.enabled(Level::WARN) {
            tracing::warn!(task = %self.inner.task_name, attempt = self.attempt(), "{message}");
            self.inner
                .shared
                .append_to_shared_log(self.format_line(&format!("[WARNING] {message}")));
        }
    }

    pub fn log_error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.enabled(Level::ERROR) {
            tracing::error!(task = %self.inner.task_name, attempt = self.attempt(), "{message}");
            self.inner
                .shared
                .append_to_shared_log(self.format_line(&format!("[ERROR] {message}")));
        }
    }

    fn enabled(&self, level: Level) -> bool {
        level <= self.inner.shared.get_logging_level()
    }

    fn format_line(&self, message: &str) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        let attempt = self.attempt();
        let attempt_status = if attempt == 0 {
            "     ".to_string()
        } else {
            format!("{}/{}", attempt, self.max_attempt())
        };
        format!(
            "{now} {attempt_status:<5} {} {:<20} {message}",
            self.inner.icon, self.inner.task_name
        )
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("task_name", &self.inner.task_name)
            .field("attempt", &self.attempt())
            .finish()
    }
}

fn stylize(color: u8, text: &str) -> String {
    format!("\x1b[38;5;{color}m{text}\x1b[0m")
}
