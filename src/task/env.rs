// ABOUTME: Declarative environment variable specification for tasks
// ABOUTME: Resolves to the OS value when linked, otherwise the rendered default

use crate::context::SharedContext;
use crate::engine::error::Result;

use super::attr::StrAttr;

/// A declared environment variable of a task.
///
/// On context construction the variable resolves to the OS environment
/// value when `link_to_os` is set and the variable exists, otherwise to
/// the declared default. Envs attached to a task are collected
/// transitively through its upstreams.
#[derive(Debug, Clone)]
pub struct Env {
    name: String,
    default: StrAttr,
    os_name: Option<String>,
    link_to_os: bool,
    auto_render: bool,
}

impl Env {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: StrAttr::Value(String::new()),
            os_name: None,
            link_to_os: true,
            auto_render: true,
        }
    }

    pub fn with_default(mut self, default: impl Into<StrAttr>) -> Self {
        self.default = default.into();
        self
    }

    /// The OS variable to read when linked. Defaults to the env's name.
    pub fn with_os_name(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = Some(os_name.into());
        self
    }

    pub fn with_link_to_os(mut self, link_to_os: bool) -> Self {
        self.link_to_os = link_to_os;
        self
    }

    pub fn with_auto_render(mut self, auto_render: bool) -> Self {
        self.auto_render = auto_render;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn os_name(&self) -> &str {
        self.os_name.as_deref().unwrap_or(&self.name)
    }

    /// Resolve this env and write it into the shared env map.
    pub fn update_context(&self, shared: &SharedContext) -> Result<()> {
        if self.link_to_os {
            if let Ok(value) = std::env::var(self.os_name()) {
                shared.set_env(&self.name, value);
                return Ok(());
            }
        }
        let value = self.default.resolve(shared, self.auto_render)?;
        shared.set_env(&self.name, value);
        Ok(())
    }
}
