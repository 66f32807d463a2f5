// ABOUTME: Process-wide execution state shared by every task in a session
// ABOUTME: Holds inputs, environment, args, xcom slots, the shared log, and rendering

use std::sync::{Mutex, RwLock, Weak};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::Level;

use crate::session::{Session, SessionInner};
use crate::template::{RenderScope, Renderer, Result as TemplateResult};

use super::xcom::Xcom;

/// Shared state bag observed by every task context in a session.
///
/// Created at run start, mutated only from the event loop, and dropped
/// when the session terminates. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SharedContext {
    inner: std::sync::Arc<SharedInner>,
}

struct SharedInner {
    input: RwLock<IndexMap<String, JsonValue>>,
    env: RwLock<IndexMap<String, String>>,
    args: RwLock<Vec<JsonValue>>,
    xcom: RwLock<IndexMap<String, Xcom>>,
    shared_log: Mutex<Vec<String>>,
    session: Mutex<Weak<SessionInner>>,
    logging_level: RwLock<Level>,
    renderer: Renderer,
}

impl SharedContext {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(SharedInner {
                input: RwLock::new(IndexMap::new()),
                env: RwLock::new(IndexMap::new()),
                args: RwLock::new(Vec::new()),
                xcom: RwLock::new(IndexMap::new()),
                shared_log: Mutex::new(Vec::new()),
                session: Mutex::new(Weak::new()),
                logging_level: RwLock::new(Level::INFO),
                renderer: Renderer::new(),
            }),
        }
    }

    /// Positional argument values consumed by inputs that allow it.
    pub fn with_args(self, args: Vec<JsonValue>) -> Self {
        *self.inner.args.write().expect("args lock poisoned") = args;
        self
    }

    pub fn with_logging_level(self, level: Level) -> Self {
        *self
            .inner
            .logging_level
            .write()
            .expect("logging level lock poisoned") = level;
        self
    }

    pub fn get_logging_level(&self) -> Level {
        *self
            .inner
            .logging_level
            .read()
            .expect("logging level lock poisoned")
    }

    pub(crate) fn set_session(&self, session: &Session) {
        *self.inner.session.lock().expect("session lock poisoned") = session.downgrade();
    }

    /// The owning session, if it is still alive.
    pub fn session(&self) -> Option<Session> {
        self.inner
            .session
            .lock()
            .expect("session lock poisoned")
            .upgrade()
            .map(Session::from_inner)
    }

    pub fn get_input(&self, name: &str) -> Option<JsonValue> {
        self.inner
            .input
            .read()
            .expect("input lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inner
            .input
            .read()
            .expect("input lock poisoned")
            .contains_key(name)
    }

    pub fn set_input(&self, name: impl Into<String>, value: JsonValue) {
        self.inner
            .input
            .write()
            .expect("input lock poisoned")
            .insert(name.into(), value);
    }

    pub fn inputs(&self) -> IndexMap<String, JsonValue> {
        self.inner.input.read().expect("input lock poisoned").clone()
    }

    pub fn get_env(&self, name: &str) -> Option<String> {
        self.inner
            .env
            .read()
            .expect("env lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn set_env(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .env
            .write()
            .expect("env lock poisoned")
            .insert(name.into(), value.into());
    }

    /// Insert only if the key is not already present. Used for the OS
    /// environment overlay, which must never shadow declared envs.
    pub fn set_env_if_absent(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut env = self.inner.env.write().expect("env lock poisoned");
        env.entry(name.into()).or_insert_with(|| value.into());
    }

    pub fn envs(&self) -> IndexMap<String, String> {
        self.inner.env.read().expect("env lock poisoned").clone()
    }

    pub fn args(&self) -> Vec<JsonValue> {
        self.inner.args.read().expect("args lock poisoned").clone()
    }

    /// The xcom slot for a task, creating it on first reference.
    pub fn xcom(&self, slot: &str) -> Xcom {
        let mut xcom = self.inner.xcom.write().expect("xcom lock poisoned");
        xcom.entry(slot.to_string())
            .or_insert_with(|| Xcom::new(slot))
            .clone()
    }

    pub fn has_xcom(&self, slot: &str) -> bool {
        self.inner
            .xcom
            .read()
            .expect("xcom lock poisoned")
            .contains_key(slot)
    }

    pub fn xcom_slots(&self) -> Vec<String> {
        self.inner
            .xcom
            .read()
            .expect("xcom lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn append_to_shared_log(&self, line: impl Into<String>) {
        self.inner
            .shared_log
            .lock()
            .expect("shared log lock poisoned")
            .push(line.into());
    }

    pub fn shared_log(&self) -> Vec<String> {
        self.inner
            .shared_log
            .lock()
            .expect("shared log lock poisoned")
            .clone()
    }

    pub fn render(&self, template: &str) -> TemplateResult<String> {
        self.inner.renderer.render(self, template)
    }

    pub fn render_bool(&self, template: &str) -> TemplateResult<bool> {
        self.inner.renderer.render_bool(self, template)
    }

    pub fn render_int(&self, template: &str) -> TemplateResult<i64> {
        self.inner.renderer.render_int(self, template)
    }

    pub fn render_float(&self, template: &str) -> TemplateResult<f64> {
        self.inner.renderer.render_float(self, template)
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("inputs", &self.inputs())
            .field("args", &self.args())
            .field("xcom_slots", &self.xcom_slots())
            .finish()
    }
}

impl RenderScope for SharedContext {
    fn lookup_input(&self, key: &str) -> Option<JsonValue> {
        self.get_input(key)
    }

    fn input_keys(&self) -> Vec<String> {
        self.inner
            .input
            .read()
            .expect("input lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn lookup_env(&self, key: &str) -> Option<String> {
        self.get_env(key)
    }

    fn args(&self) -> Vec<JsonValue> {
        SharedContext::args(self)
    }

    fn xcom_peek(&self, slot: &str) -> Option<JsonValue> {
        if !self.has_xcom(slot) {
            return None;
        }
        self.xcom(slot).peek().ok()
    }

    fn xcom_keys(&self) -> Vec<String> {
        self.xcom_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_round_trip() {
        let shared = SharedContext::new();
        shared.set_input("name", json!("alice"));

        assert!(shared.has_input("name"));
        assert_eq!(shared.get_input("name"), Some(json!("alice")));
        assert_eq!(shared.get_input("missing"), None);
    }

    #[test]
    fn test_env_overlay_does_not_shadow() {
        let shared = SharedContext::new();
        shared.set_env("KEY", "declared");
        shared.set_env_if_absent("KEY", "from-os");
        shared.set_env_if_absent("OTHER", "from-os");

        assert_eq!(shared.get_env("KEY"), Some("declared".to_string()));
        assert_eq!(shared.get_env("OTHER"), Some("from-os".to_string()));
    }

    #[test]
    fn test_xcom_slot_created_on_first_reference() {
        let shared = SharedContext::new();
        assert!(!shared.has_xcom("task"));

        shared.xcom("task").push(json!(1));
        assert!(shared.has_xcom("task"));
        assert_eq!(shared.xcom("task").peek().unwrap(), json!(1));
    }

    #[test]
    fn test_render_against_live_state() {
        let shared = SharedContext::new();
        shared.set_input("who", json!("world"));
        shared.set_env("HOME", "/root");

        assert_eq!(shared.render("hi {ctx.input.who}").unwrap(), "hi world");
        assert_eq!(shared.render("{ctx.env.HOME}/work").unwrap(), "/root/work");
    }

    #[test]
    fn test_logging_level_round_trip() {
        let shared = SharedContext::new().with_logging_level(Level::DEBUG);
        assert_eq!(shared.get_logging_level(), Level::DEBUG);
    }

    #[test]
    fn test_shared_log_accumulates() {
        let shared = SharedContext::new();
        shared.append_to_shared_log("first");
        shared.append_to_shared_log("second");
        assert_eq!(shared.shared_log(), vec!["first", "second"]);
    }
}
