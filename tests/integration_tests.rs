// ABOUTME: Property-style integration tests: run-once, exclusivity, cancellation
// ABOUTME: Also covers state-log snapshots and readiness monitoring restarts

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use weft::task::TaskState;
use weft::{ExecutionError, FileStateLogger, Session, SharedContext, StrKwargs, Task};

mod common;
use common::{count_transitions, returning_task, CollectingStateLogger};

// A diamond a -> (b, c) -> d: every node runs exactly once even though
// d is reachable via two paths.
#[tokio::test]
async fn test_diamond_runs_each_task_once() {
    let a_runs = Arc::new(AtomicUsize::new(0));
    let d_runs = Arc::new(AtomicUsize::new(0));

    let a_counter = Arc::clone(&a_runs);
    let a = Task::builder("a")
        .retries(0)
        .action_fn(move |_ctx| {
            let a_counter = Arc::clone(&a_counter);
            async move {
                a_counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("a"))
            }
        })
        .build();
    let b = Task::builder("b").retries(0).upstream(&a).build();
    let c = Task::builder("c").retries(0).upstream(&a).build();
    let d_counter = Arc::clone(&d_runs);
    let d = Task::builder("d")
        .retries(0)
        .upstream(&b)
        .upstream(&c)
        .action_fn(move |_ctx| {
            let d_counter = Arc::clone(&d_counter);
            async move {
                d_counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("d"))
            }
        })
        .build();

    let session = Session::new(SharedContext::new());
    d.async_run(Some(session.clone()), StrKwargs::new())
        .await
        .unwrap();

    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
    assert_eq!(d_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        count_transitions(&session.get_task_status(&d), TaskState::Started),
        1
    );
}

// Successors and fallbacks are exclusive: on success the successor runs
// and the fallback is skipped.
#[tokio::test]
async fn test_successor_runs_and_fallback_skipped_on_success() {
    let source = returning_task("source", "ok");
    let successor = returning_task("successor", "next");
    let fallback = returning_task("fallback", "rescue");
    source.append_successor(&successor);
    source.append_fallback(&fallback);

    let session = Session::new(SharedContext::new());
    source
        .async_run(Some(session.clone()), StrKwargs::new())
        .await
        .unwrap();

    assert!(session.get_task_status(&successor).is_completed());
    assert!(session.get_task_status(&fallback).is_skipped());
    assert!(!session.get_task_status(&fallback).is_started());
}

// ... and on permanent failure the fallback runs and the successor is
// skipped.
#[tokio::test]
async fn test_fallback_runs_and_successor_skipped_on_failure() {
    let source = common::failing_task("source", 0, "boom");
    let successor = returning_task("successor", "next");
    let fallback = returning_task("fallback", "rescue");
    source.append_successor(&successor);
    source.append_fallback(&fallback);

    let session = Session::new(SharedContext::new());
    let err = source
        .async_run(Some(session.clone()), StrKwargs::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("boom"));

    assert!(session.get_task_status(&fallback).is_completed());
    assert!(session.get_task_status(&successor).is_skipped());
    assert!(!session.get_task_status(&successor).is_started());
}

// With retries = n, a run performs at most n + 1 attempts.
#[tokio::test]
async fn test_retry_bound() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let task = Task::builder("bounded")
        .retries(1)
        .action_fn(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always fails")
            }
        })
        .build();

    let session = Session::new(SharedContext::new());
    task.async_run(Some(session.clone()), StrKwargs::new())
        .await
        .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(
        count_transitions(&session.get_task_status(&task), TaskState::Started),
        2
    );
    assert!(session.get_task_status(&task).is_permanently_failed());
}

// A failure in one branch terminates the session; the whole run fails
// with the original error.
#[tokio::test]
async fn test_failure_terminates_session() {
    let bad = common::failing_task("bad", 0, "broken");
    let after = Task::builder("after")
        .retries(0)
        .upstream(&bad)
        .action_fn(|_ctx| async move { Ok(json!("never")) })
        .build();

    let session = Session::new(SharedContext::new());
    let err = after
        .async_run(Some(session.clone()), StrKwargs::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("broken"));
    assert!(session.is_terminated());
    assert!(!session.get_task_status(&after).is_started());
    assert!(session.get_task_status(&after).is_terminated());
}

// Terminating a session from outside cancels deferred coroutines and
// lets the run return with the main task's result.
#[tokio::test]
async fn test_external_terminate_cancels_deferred_actions() {
    let ping = Task::builder("ping")
        .retries(0)
        .action_fn(|_ctx| async move { Ok(json!("pong")) })
        .build();
    let server = Task::builder("server")
        .retries(0)
        .readiness_check(&ping)
        .readiness_check_delay(Duration::from_millis(10))
        .monitor_readiness(true)
        .readiness_check_period(Duration::from_millis(50))
        .action_fn(|_ctx| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!("unreachable"))
        })
        .build();
    let client = Task::builder("client")
        .retries(0)
        .upstream(&server)
        .action_fn(|_ctx| async move { Ok(json!("ok")) })
        .build();

    let session = Session::new(SharedContext::new());
    let terminator = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        terminator.terminate();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.async_run(Some(session.clone()), StrKwargs::new()),
    )
    .await
    .expect("run returned promptly after terminate")
    .unwrap();

    assert_eq!(result, json!("ok"));
    assert!(session.is_terminated());
    assert!(session.get_task_status(&server).is_terminated());
}

// When readiness checks start failing past the threshold, the monitor
// cancels the running action and launches a fresh one.
#[tokio::test]
async fn test_monitoring_restarts_action_on_readiness_failure() {
    let action_starts = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(AtomicBool::new(true));

    let health = Arc::clone(&healthy);
    let ping = Task::builder("ping")
        .retries(0)
        .action_fn(move |_ctx| {
            let health = Arc::clone(&health);
            async move {
                if health.load(Ordering::SeqCst) {
                    Ok(json!("pong"))
                } else {
                    anyhow::bail!("unhealthy")
                }
            }
        })
        .build();
    let starts = Arc::clone(&action_starts);
    let server = Task::builder("server")
        .retries(0)
        .readiness_check(&ping)
        .readiness_check_delay(Duration::from_millis(10))
        .readiness_check_period(Duration::from_millis(40))
        .readiness_failure_threshold(1)
        .readiness_timeout(Duration::from_secs(1))
        .monitor_readiness(true)
        .action_fn(move |_ctx| {
            let starts = Arc::clone(&starts);
            async move {
                starts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!("unreachable"))
            }
        })
        .build();

    let session = Session::new(SharedContext::new());
    let flipper = Arc::clone(&healthy);
    let terminator = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        flipper.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        terminator.terminate();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        server.async_run(Some(session.clone()), StrKwargs::new()),
    )
    .await
    .expect("run returned promptly after terminate");

    // The server never completed, so the run surfaces an empty slot.
    assert!(matches!(result, Err(ExecutionError::Xcom(_))));
    assert!(
        action_starts.load(Ordering::SeqCst) >= 2,
        "monitor relaunched the action after sustained readiness failure"
    );
}

// The engine emits an initial snapshot, periodic snapshots, and a final
// terminated snapshot carrying statuses and the result.
#[tokio::test]
async fn test_state_logger_snapshots() {
    let logger = CollectingStateLogger::new();
    let session = Session::new(SharedContext::new())
        .with_state_logger(Arc::new(logger.clone()));

    let slow = Task::builder("slow")
        .retries(0)
        .action_fn(|_ctx| async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok(json!("slow-done"))
        })
        .build();

    slow.async_run(Some(session.clone()), StrKwargs::new())
        .await
        .unwrap();

    let snapshots = logger.snapshots();
    assert!(snapshots.len() >= 3, "initial + periodic + final snapshots");

    let first = snapshots.first().unwrap();
    assert_eq!(first.main_task_name, "slow");
    assert!(!first.is_terminated);

    let last = snapshots.last().unwrap();
    assert!(last.is_terminated);
    assert_eq!(last.final_result, "slow-done");
    assert!(last.task_status["slow"].is_completed);
    assert!(!last.task_status["slow"].history.is_empty());
}

#[tokio::test]
async fn test_file_state_logger_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(SharedContext::new())
        .with_state_logger(Arc::new(FileStateLogger::new(dir.path())));
    let session_name = session.name().to_string();

    let task = returning_task("only", "value");
    task.async_run(Some(session), StrKwargs::new()).await.unwrap();

    let logger = FileStateLogger::new(dir.path());
    let log = logger.read(&session_name).unwrap();
    assert!(log.is_terminated);
    assert_eq!(log.final_result, "value");
    assert_eq!(log.path, vec!["only"]);
}

// Rendering a template with no placeholders is the identity, end to end.
#[tokio::test]
async fn test_render_identity_without_placeholders() {
    let task = Task::builder("plain")
        .retries(0)
        .action_template("nothing to substitute here")
        .build();
    let result = task.async_run(None, StrKwargs::new()).await.unwrap();
    assert_eq!(result, json!("nothing to substitute here"));
}

// The blocking entry point drives a run on its own runtime.
#[test]
fn test_blocking_run() {
    let task = returning_task("blocking", "done");
    let result = task.run(StrKwargs::new()).unwrap();
    assert_eq!(result, json!("done"));
}
