// ABOUTME: Run entry points: context filling, root fan-out, and state-log snapshots
// ABOUTME: Owns session setup and guaranteed termination around a run

use std::time::Duration;

use futures::future::join_all;
use serde_json::Value as JsonValue;

use crate::context::SharedContext;
use crate::session::{json_to_display, Session};
use crate::task::{StrKwargs, Task};

use super::error::Result;
use super::execution::execute_task_chain;

/// Interval between periodic session-state snapshots.
const STATE_LOG_PERIOD: Duration = Duration::from_millis(100);

/// Run a task's graph, guaranteeing the session is terminated when the
/// run finishes or fails. This backs `Task::run` and `Task::async_run`.
pub(crate) async fn run_and_cleanup(
    task: Task,
    session: Option<Session>,
    kwargs: StrKwargs,
) -> Result<JsonValue> {
    let session = session.unwrap_or_else(|| Session::new(SharedContext::new()));
    let result = run_task_async(&task, &session, &kwargs).await;
    if !session.is_terminated() {
        session.terminate();
    }
    result
}

/// Fill the shared context from declared inputs and the OS environment,
/// then enter the root task fan-out.
async fn run_task_async(task: &Task, session: &Session, kwargs: &StrKwargs) -> Result<JsonValue> {
    session.register_task(task)?;
    fill_shared_context_inputs(task, session.shared_ctx(), kwargs)?;
    fill_shared_context_envs(session.shared_ctx());
    execute_root_tasks(task, session).await
}

/// Resolve every declared input of the main task's upstream closure.
///
/// Priority per input: caller-supplied kwarg, then the next positional
/// argument (for inputs that allow it), then prompt/default inside the
/// input itself.
fn fill_shared_context_inputs(
    task: &Task,
    shared: &SharedContext,
    kwargs: &StrKwargs,
) -> Result<()> {
    let args = shared.args();
    let mut arg_index = 0usize;
    for input in task.inputs() {
        if shared.has_input(input.name()) {
            continue;
        }
        let provided: Option<String> = match kwargs.get(input.name()) {
            Some(value) => Some(value.clone()),
            None if input.allow_positional() && arg_index < args.len() => {
                let value = json_to_display(&args[arg_index]);
                arg_index += 1;
                Some(value)
            }
            None => None,
        };
        input.update_shared_context(shared, provided.as_deref())?;
    }
    Ok(())
}

/// Overlay the OS environment into the shared env map for any key not
/// already set by input/env resolution.
fn fill_shared_context_envs(shared: &SharedContext) {
    for (key, value) in std::env::vars() {
        shared.set_env_if_absent(key, value);
    }
}

/// Designate the main task, fan out over the roots of its upstream
/// closure, await deferred coroutines, and terminate.
async fn execute_root_tasks(task: &Task, session: &Session) -> Result<JsonValue> {
    session.set_main_task(task)?;
    session.state_logger().write(&session.as_state_log());
    let logger_handle = tokio::spawn(log_session_state(session.clone()));

    let run_result = run_root_chains(task, session).await;

    session.terminate();
    let _ = logger_handle.await;
    session.state_logger().write(&session.as_state_log());

    run_result?;
    Ok(session.final_result()?)
}

async fn run_root_chains(task: &Task, session: &Session) -> Result<()> {
    let ctx = task.get_ctx(session)?;
    let root_tasks: Vec<Task> = session
        .get_root_tasks(task)
        .into_iter()
        .filter(|root| session.is_allowed_to_run(root))
        .collect();

    if root_tasks.is_empty() {
        ctx.log_info("no root tasks to execute");
        return Ok(());
    }

    ctx.log_info(format!("executing {} root task(s)", root_tasks.len()));
    let chains = root_tasks
        .into_iter()
        .map(|root| execute_task_chain(root, session.clone()));
    for result in join_all(chains).await {
        result?;
    }

    ctx.log_info("waiting for deferred actions");
    session.wait_deferred().await?;
    ctx.log_info("deferred actions complete");
    Ok(())
}

/// Periodic state-snapshot loop; writes one final snapshot after the
/// session terminates.
async fn log_session_state(session: Session) {
    while !session.is_terminated() {
        session.state_logger().write(&session.as_state_log());
        tokio::time::sleep(STATE_LOG_PERIOD).await;
    }
    session.state_logger().write(&session.as_state_log());
}
