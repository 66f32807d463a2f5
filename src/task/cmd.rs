// ABOUTME: Shell command task built on the engine's action hook seam
// ABOUTME: Renders the command against the live context and captures its output

use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context as AnyhowContext;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::context::Context;

use super::action::ActionHook;
use super::attr::StrAttr;
use super::{Task, TaskBuilder};

/// Builder for a task that runs a shell command.
///
/// The command string is a template rendered against the live context,
/// so `{ctx.input.x}` placeholders work the same as in string actions.
/// Stdout lines are streamed through the task's `print`, and the
/// combined stdout is the task's result. A non-zero exit fails the
/// attempt, which makes commands participate in retries and fallbacks.
pub struct CmdTask {
    builder: TaskBuilder,
    command: StrAttr,
    shell: String,
    cwd: Option<StrAttr>,
    env: IndexMap<String, StrAttr>,
}

impl CmdTask {
    pub fn new(name: impl Into<String>, command: impl Into<StrAttr>) -> Self {
        Self {
            builder: Task::builder(name),
            command: command.into(),
            shell: "bash".to_string(),
            cwd: None,
            env: IndexMap::new(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<StrAttr>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<StrAttr>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Apply task-level configuration (retries, upstreams, inputs, ...)
    /// through the underlying builder.
    pub fn configure(mut self, f: impl FnOnce(TaskBuilder) -> TaskBuilder) -> Self {
        self.builder = f(self.builder);
        self
    }

    pub fn build(self) -> Task {
        let hook = CmdAction {
            command: self.command,
            shell: self.shell,
            cwd: self.cwd,
            env: self.env,
        };
        self.builder.action_hook(Arc::new(hook)).build()
    }
}

struct CmdAction {
    command: StrAttr,
    shell: String,
    cwd: Option<StrAttr>,
    env: IndexMap<String, StrAttr>,
}

#[async_trait]
impl ActionHook for CmdAction {
    async fn run(&self, ctx: Context) -> anyhow::Result<JsonValue> {
        let script = self.command.resolve(ctx.shared(), true)?;
        ctx.log_info(format!("running: {script}"));

        let mut command = tokio::process::Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd.resolve(ctx.shared(), true)?);
        }
        for (name, value) in ctx.shared().envs() {
            command.env(name, value);
        }
        for (name, value) in &self.env {
            command.env(name, value.resolve(ctx.shared(), true)?);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {:?}", self.shell))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let out_ctx = ctx.clone();
        let stdout_reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                out_ctx.print(&line);
                collected.push(line);
            }
            collected
        });
        let err_ctx = ctx.clone();
        let stderr_reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                err_ctx.print(&line);
                collected.push(line);
            }
            collected
        });

        let status = child.wait().await.context("failed to wait for command")?;
        let stdout_lines = stdout_reader.await.unwrap_or_default();
        let stderr_lines = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            anyhow::bail!(
                "command exited with {}: {}",
                status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr_lines.join("\n")
            );
        }
        Ok(JsonValue::String(stdout_lines.join("\n")))
    }
}
