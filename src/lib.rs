// ABOUTME: Main library module for the weft task orchestration engine
// ABOUTME: Exports the task graph API, session runtime, and template surface

pub mod context;
pub mod engine;
pub mod logging;
pub mod session;
pub mod task;
pub mod template;

// Re-export commonly used types
pub use context::{Context, SharedContext, Xcom, XcomError};
pub use engine::{ExecutionError, Result};
pub use logging::init_logging;
pub use session::{
    FileStateLogger, NullStateLogger, Session, SessionStateLog, StateLogger,
};
pub use task::{
    ActionHook, BoolAttr, CmdTask, Env, Group, Input, InputKind, StrAttr, StrKwargs, Task,
    TaskBuilder, TaskState, TaskStatus,
};
pub use template::{Renderer, TemplateError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
