// ABOUTME: Execution context module: shared state, per-task views, and xcom slots
// ABOUTME: Everything here is mutated only from the session's event loop

pub mod shared;
pub mod task_ctx;
pub mod xcom;

pub use shared::SharedContext;
pub use task_ctx::Context;
pub use xcom::{Xcom, XcomError};
