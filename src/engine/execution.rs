// ABOUTME: The execution protocol: chain traversal, readiness gating, retry loop
// ABOUTME: Successors fire on completion, fallbacks on permanent failure

use futures::future::{join_all, BoxFuture};
use serde_json::Value as JsonValue;

use crate::context::Context;
use crate::session::Session;
use crate::task::{Task, TaskAction};

use super::error::{ExecutionError, Result};
use super::monitoring::monitor_task_readiness;

/// Execute the task, then propagate completion through its registered
/// downstreams. Chains fan out concurrently and never re-walk the graph.
pub(crate) fn execute_task_chain(task: Task, session: Session) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        if session.is_terminated() || !session.is_allowed_to_run(&task) {
            return Ok(());
        }
        execute_task_action(&task, &session).await?;

        let nexts = session.get_next_tasks(&task);
        if session.is_terminated() || nexts.is_empty() {
            return Ok(());
        }
        let chains = nexts
            .into_iter()
            .map(|next| execute_task_chain(next, session.clone()));
        collect_errors(join_all(chains).await)
    })
}

/// Execute a single task's action, handling the execute-condition and
/// readiness checks.
async fn execute_task_action(task: &Task, session: &Session) -> Result<()> {
    let ctx = task.get_ctx(session)?;
    if !session.try_claim(task) {
        // Will be triggered again once the remaining upstreams finish.
        ctx.log_info("not allowed to run");
        return Ok(());
    }
    if !check_execute_condition(task, &ctx, session) {
        ctx.log_info("marked as skipped (condition false)");
        session.get_task_status(task).mark_as_skipped();
        return Ok(());
    }
    execute_action_until_ready(task, session).await
}

/// Evaluate the execute-condition. A condition that fails to render is
/// treated as false: the task is skipped rather than failed.
fn check_execute_condition(task: &Task, ctx: &Context, session: &Session) -> bool {
    match task.execute_condition().resolve(session.shared_ctx()) {
        Ok(value) => value,
        Err(e) => {
            ctx.log_warning(format!("execute condition did not render ({e}), skipping"));
            false
        }
    }
}

/// Run the action, coordinating with readiness checks.
///
/// Without checks the action runs inline. With checks the action is
/// detached, the checks gate READY, and the still-running action is
/// deferred onto the session to be awaited before shutdown.
async fn execute_action_until_ready(task: &Task, session: &Session) -> Result<()> {
    let ctx = task.get_ctx(session)?;
    let readiness_checks = task.readiness_checks();

    if readiness_checks.is_empty() {
        ctx.log_info("no readiness checks");
        execute_action_with_retry(task.clone(), session.clone()).await?;
        let status = session.get_task_status(task);
        if status.is_completed() {
            ctx.log_info("marked as ready");
            status.mark_as_ready();
        }
        return Ok(());
    }

    ctx.log_info("starting action and readiness checks");
    let action_handle = tokio::spawn(execute_action_with_retry(task.clone(), session.clone()));
    let action_abort = action_handle.abort_handle();

    tokio::time::sleep(task.readiness_check_delay()).await;

    ctx.log_info("waiting for readiness checks");
    let checks = readiness_checks
        .iter()
        .map(|check| execute_task_chain(check.clone(), session.clone()));
    let check_error = collect_errors(join_all(checks).await).err();

    let readiness_passed = check_error.is_none()
        && readiness_checks
            .iter()
            .all(|check| session.get_task_status(check).is_completed());
    if readiness_passed {
        if !session.get_task_status(task).is_failed() {
            ctx.log_info("marked as ready");
            session.get_task_status(task).mark_as_ready();
        }
    } else {
        ctx.log_warning("one or more readiness checks did not complete");
    }

    // The action keeps running past readiness; the session awaits it
    // before shutdown.
    session.defer_action(task, action_handle);

    if readiness_passed && task.monitor_readiness() {
        let monitor = tokio::spawn(monitor_task_readiness(
            task.clone(),
            session.clone(),
            action_abort,
        ));
        session.defer_monitoring(task, monitor);
    }

    match check_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// The retry loop. On success the result lands in the task's xcom slot,
/// fallbacks are skipped, and successors run. On the final failed
/// attempt successors are skipped, fallbacks run, and the error is
/// re-raised.
pub(crate) async fn execute_action_with_retry(task: Task, session: Session) -> Result<JsonValue> {
    let ctx = task.get_ctx(&session)?;
    let max_attempt = task.retries() + 1;
    ctx.set_max_attempt(max_attempt);

    for attempt in 1..=max_attempt {
        ctx.set_attempt(attempt);
        if attempt > 1 {
            ctx.log_info(format!("retrying in {:?}", task.retry_period()));
            tokio::time::sleep(task.retry_period()).await;
        }

        ctx.log_info("marked as started");
        session.get_task_status(&task).mark_as_started();

        match run_task_action(&task, &ctx).await {
            Ok(result) => {
                ctx.log_info("marked as completed");
                session.get_task_status(&task).mark_as_completed();
                ctx.xcom(task.name()).push(result.clone());

                skip_fallbacks(&task, &session);
                execute_successors(&task, &session).await?;
                return Ok(result);
            }
            Err(source) => {
                ctx.log_error(format!("attempt {attempt}/{max_attempt} failed: {source:#}"));
                session.get_task_status(&task).mark_as_failed();

                if attempt < max_attempt {
                    continue;
                }
                ctx.log_error("marked as permanently failed");
                session.get_task_status(&task).mark_as_permanently_failed();

                skip_successors(&task, &session);
                if let Err(fallback_error) = execute_fallbacks(&task, &session).await {
                    // Fallback failures are logged but never mask the
                    // original action error.
                    ctx.log_error(format!("fallback failed: {fallback_error}"));
                }
                return Err(ExecutionError::ActionFailed {
                    task: task.name().to_string(),
                    source,
                });
            }
        }
    }
    unreachable!("retry loop returns on every path")
}

/// Default action hook: render string actions, await callable actions.
async fn run_task_action(task: &Task, ctx: &Context) -> anyhow::Result<JsonValue> {
    match task.action() {
        TaskAction::None => {
            ctx.log_debug("no action defined");
            Ok(JsonValue::Null)
        }
        TaskAction::Template(template) => Ok(JsonValue::String(ctx.render(template)?)),
        TaskAction::Func(action) => action(ctx.clone()).await,
        TaskAction::Hook(hook) => hook.run(ctx.clone()).await,
    }
}

async fn execute_successors(task: &Task, session: &Session) -> Result<()> {
    let successors = task.successors();
    if successors.is_empty() {
        return Ok(());
    }
    task.get_ctx(session)?
        .log_info(format!("executing {} successor(s)", successors.len()));
    let chains = successors
        .into_iter()
        .map(|successor| execute_task_chain(successor, session.clone()));
    collect_errors(join_all(chains).await)
}

fn skip_successors(task: &Task, session: &Session) {
    for successor in task.successors() {
        let status = session.get_task_status(&successor);
        if !status.is_skipped() {
            status.mark_as_skipped();
        }
    }
}

async fn execute_fallbacks(task: &Task, session: &Session) -> Result<()> {
    let fallbacks = task.fallbacks();
    if fallbacks.is_empty() {
        return Ok(());
    }
    task.get_ctx(session)?
        .log_info(format!("executing {} fallback(s)", fallbacks.len()));
    let chains = fallbacks
        .into_iter()
        .map(|fallback| execute_task_chain(fallback, session.clone()));
    collect_errors(join_all(chains).await)
}

fn skip_fallbacks(task: &Task, session: &Session) {
    for fallback in task.fallbacks() {
        let status = session.get_task_status(&fallback);
        if !status.is_skipped() {
            status.mark_as_skipped();
        }
    }
}

fn collect_errors(results: Vec<Result<()>>) -> Result<()> {
    for result in results {
        result?;
    }
    Ok(())
}
