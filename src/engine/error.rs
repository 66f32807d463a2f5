// ABOUTME: Error types for session execution and scheduling
// ABOUTME: Distinguishes usage errors, action failures, render failures, and xcom underflow

use thiserror::Error;

use crate::context::XcomError;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Malformed graph or input/env declaration, detected before or
    /// during registration.
    #[error("usage error: {message}")]
    Usage { message: String },

    /// A user action failed on its final attempt.
    #[error("task {task:?} failed: {source}")]
    ActionFailed {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Xcom(#[from] XcomError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ExecutionError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
