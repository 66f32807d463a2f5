// ABOUTME: The unit of user code bound to a task, executed once per attempt
// ABOUTME: Actions are template strings, async closures, or hook implementations

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

use crate::context::Context;

/// Boxed async closure form of an action.
pub type ActionFn =
    Arc<dyn Fn(Context) -> BoxFuture<'static, anyhow::Result<JsonValue>> + Send + Sync>;

/// Implemented by task kinds that override the default action behavior,
/// e.g. the shell command task.
#[async_trait]
pub trait ActionHook: Send + Sync {
    async fn run(&self, ctx: Context) -> anyhow::Result<JsonValue>;
}

/// What a task does when it runs.
///
/// A `Template` action renders the string against the live context and
/// returns the result; `Func` and `Hook` run user code.
#[derive(Clone)]
pub enum TaskAction {
    None,
    Template(String),
    Func(ActionFn),
    Hook(Arc<dyn ActionHook>),
}

impl TaskAction {
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<JsonValue>> + Send + 'static,
    {
        TaskAction::Func(Arc::new(move |ctx| Box::pin(f(ctx))))
    }
}

impl std::fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskAction::None => f.write_str("None"),
            TaskAction::Template(template) => f.debug_tuple("Template").field(template).finish(),
            TaskAction::Func(_) => f.write_str("Func(..)"),
            TaskAction::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}
