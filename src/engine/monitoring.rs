// ABOUTME: Readiness monitoring loop for long-running service-like tasks
// ABOUTME: Re-verifies readiness and restarts the owning action on sustained failure

use futures::future::join_all;
use tokio::task::AbortHandle;
use tokio::time::timeout;

use crate::session::Session;
use crate::task::Task;

use super::execution::{execute_action_with_retry, execute_task_chain};

/// Periodically re-run the task's readiness checks while the session is
/// live. When consecutive failures reach the threshold, the current
/// action is cancelled, the task status is reset, and a fresh action is
/// launched and deferred onto the session.
pub(crate) async fn monitor_task_readiness(
    task: Task,
    session: Session,
    mut action_abort: AbortHandle,
) {
    let ctx = match task.get_ctx(&session) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(task = %task.name(), "monitoring could not build context: {e}");
            return;
        }
    };
    let readiness_checks = task.readiness_checks();
    if readiness_checks.is_empty() {
        ctx.log_debug("no readiness checks, monitoring is not applicable");
        return;
    }

    let mut failure_count = 0usize;
    ctx.log_info("starting readiness monitoring");

    while !session.is_terminated() {
        tokio::time::sleep(task.readiness_check_period()).await;
        if session.is_terminated() {
            break;
        }

        if failure_count < task.readiness_failure_threshold() {
            ctx.log_info("performing periodic readiness check");
            // Reset check state so the chains run again. Clearing the
            // xcom wholesale mirrors how slots are seeded on reset.
            for check in &readiness_checks {
                let status = session.get_task_status(check);
                status.reset_history();
                status.reset();
                session.release_claim(check);
                ctx.xcom(check.name()).clear();
            }

            let cycle = readiness_checks
                .iter()
                .map(|check| execute_task_chain(check.clone(), session.clone()));
            match timeout(task.readiness_timeout(), join_all(cycle)).await {
                Ok(results) => {
                    let cycle_failed = results.iter().any(|result| result.is_err());
                    let all_completed = readiness_checks
                        .iter()
                        .all(|check| session.get_task_status(check).is_completed());
                    if !cycle_failed && all_completed {
                        ctx.log_info("readiness check ok");
                        failure_count = 0;
                        continue;
                    }
                    failure_count += 1;
                    ctx.log_warning(format!(
                        "periodic readiness check failed ({failure_count}/{})",
                        task.readiness_failure_threshold()
                    ));
                }
                Err(_elapsed) => {
                    failure_count += 1;
                    ctx.log_warning(format!(
                        "readiness check timed out after {:?} ({failure_count}/{})",
                        task.readiness_timeout(),
                        task.readiness_failure_threshold()
                    ));
                    for check in &readiness_checks {
                        let status = session.get_task_status(check);
                        if !status.is_finished() {
                            status.mark_as_failed();
                        }
                    }
                }
            }
        }

        if failure_count >= task.readiness_failure_threshold() {
            ctx.log_warning(format!(
                "readiness failure threshold ({}) reached",
                task.readiness_failure_threshold()
            ));

            ctx.log_info("cancelling current action");
            action_abort.abort();

            ctx.log_info("resetting task status");
            session.get_task_status(&task).reset();

            ctx.log_info("re-executing task action");
            let new_action = tokio::spawn(execute_action_with_retry(task.clone(), session.clone()));
            action_abort = new_action.abort_handle();
            session.defer_action(&task, new_action);

            failure_count = 0;
            ctx.log_info("continuing monitoring");
        }
    }

    ctx.log_info("stopping readiness monitoring");
}
