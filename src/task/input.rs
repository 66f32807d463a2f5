// ABOUTME: Declarative task input specification and value resolution
// ABOUTME: Resolves values from kwargs, positional args, interactive prompt, or default

use std::io::{BufRead, IsTerminal, Write};

use serde_json::Value as JsonValue;

use crate::context::SharedContext;
use crate::engine::error::{ExecutionError, Result};
use crate::template::helpers::{to_boolean, to_snake_case};

use super::attr::StrAttr;

/// The value type an input's resolved string is parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Str,
    Bool,
    Int,
    Float,
}

/// A declared parameter of a task.
///
/// Inputs are deduplicated by name across the upstream closure, so a
/// graph can share one declaration between many tasks.
#[derive(Debug, Clone)]
pub struct Input {
    name: String,
    description: Option<String>,
    prompt: Option<String>,
    default: StrAttr,
    kind: InputKind,
    auto_render: bool,
    allow_empty: bool,
    allow_positional: bool,
}

impl Input {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            prompt: None,
            default: StrAttr::Value(String::new()),
            kind: InputKind::Str,
            auto_render: true,
            allow_empty: false,
            allow_positional: true,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(InputKind::Bool).with_default("false")
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(InputKind::Int).with_default("0")
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(InputKind::Float).with_default("0.0")
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<StrAttr>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_kind(mut self, kind: InputKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_auto_render(mut self, auto_render: bool) -> Self {
        self.auto_render = auto_render;
        self
    }

    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    pub fn with_allow_positional(mut self, allow_positional: bool) -> Self {
        self.allow_positional = allow_positional;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    pub fn prompt_message(&self) -> &str {
        self.prompt.as_deref().unwrap_or_else(|| self.description())
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn allow_positional(&self) -> bool {
        self.allow_positional
    }

    /// The default as a string, rendered against the live context when
    /// `auto_render` is on.
    pub fn get_default_str(&self, shared: &SharedContext) -> Result<String> {
        Ok(self.default.resolve(shared, self.auto_render)?)
    }

    /// Parse a resolved string into this input's value type.
    pub fn parse_str_value(&self, str_value: &str) -> Result<JsonValue> {
        match self.kind {
            InputKind::Str => Ok(JsonValue::String(str_value.to_string())),
            InputKind::Bool => to_boolean(str_value)
                .map(JsonValue::Bool)
                .ok_or_else(|| ExecutionError::usage(format!(
                    "input {:?} expects a boolean, got {str_value:?}",
                    self.name
                ))),
            InputKind::Int => str_value
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| ExecutionError::usage(format!(
                    "input {:?} expects an integer, got {str_value:?}",
                    self.name
                ))),
            InputKind::Float => str_value
                .trim()
                .parse::<f64>()
                .map(JsonValue::from)
                .map_err(|_| ExecutionError::usage(format!(
                    "input {:?} expects a float, got {str_value:?}",
                    self.name
                ))),
        }
    }

    /// Resolve this input's value and store it in the shared context.
    ///
    /// Priority: provided string > interactive prompt > default. The
    /// value also lands under the snake_case form of the name when that
    /// differs, so templates can use attribute access on kebab-case
    /// input names.
    pub fn update_shared_context(
        &self,
        shared: &SharedContext,
        str_value: Option<&str>,
    ) -> Result<()> {
        let str_value = match str_value {
            Some(value) => value.to_string(),
            None if self.should_prompt() => self.prompt_cli(shared)?,
            None => self.get_default_str(shared)?,
        };
        if str_value.is_empty() && !self.allow_empty {
            return Err(ExecutionError::usage(format!(
                "input {:?} must not be empty",
                self.name
            )));
        }
        let value = self.parse_str_value(&str_value)?;

        if shared.has_input(&self.name) {
            return Err(ExecutionError::usage(format!(
                "input already defined in the context: {}",
                self.name
            )));
        }
        shared.set_input(&self.name, value.clone());

        let snake_key = to_snake_case(&self.name);
        if snake_key != self.name {
            if shared.has_input(&snake_key) {
                return Err(ExecutionError::usage(format!(
                    "input already defined in the context: {snake_key}"
                )));
            }
            shared.set_input(snake_key, value);
        }
        Ok(())
    }

    fn should_prompt(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn prompt_cli(&self, shared: &SharedContext) -> Result<String> {
        loop {
            let value = self.prompt_cli_once(shared)?;
            if self.allow_empty || !value.is_empty() {
                return Ok(value);
            }
        }
    }

    fn prompt_cli_once(&self, shared: &SharedContext) -> Result<String> {
        let default = self.get_default_str(shared)?;
        let mut stderr = std::io::stderr();
        if default.is_empty() {
            write!(stderr, "{}: ", self.prompt_message())?;
        } else {
            write!(stderr, "{} [{}]: ", self.prompt_message(), default)?;
        }
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let line = line.trim();
        if line.is_empty() {
            Ok(default)
        } else {
            Ok(line.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_land_in_shared_context() {
        let shared = SharedContext::new();
        let input = Input::new("name").with_default("world");

        input.update_shared_context(&shared, None).unwrap();
        assert_eq!(shared.get_input("name"), Some(json!("world")));
    }

    #[test]
    fn test_provided_value_wins_over_default() {
        let shared = SharedContext::new();
        let input = Input::new("name").with_default("world");

        input.update_shared_context(&shared, Some("alice")).unwrap();
        assert_eq!(shared.get_input("name"), Some(json!("alice")));
    }

    #[test]
    fn test_rendered_default() {
        let shared = SharedContext::new();
        shared.set_input("base", json!("/tmp"));
        let input = Input::new("workdir").with_default("{ctx.input.base}/work");

        input.update_shared_context(&shared, None).unwrap();
        assert_eq!(shared.get_input("workdir"), Some(json!("/tmp/work")));
    }

    #[test]
    fn test_typed_inputs_parse_values() {
        let shared = SharedContext::new();
        Input::bool("go")
            .update_shared_context(&shared, Some("yes"))
            .unwrap();
        Input::int("count")
            .update_shared_context(&shared, Some("42"))
            .unwrap();
        Input::float("ratio")
            .update_shared_context(&shared, Some("0.5"))
            .unwrap();

        assert_eq!(shared.get_input("go"), Some(json!(true)));
        assert_eq!(shared.get_input("count"), Some(json!(42)));
        assert_eq!(shared.get_input("ratio"), Some(json!(0.5)));
    }

    #[test]
    fn test_bad_typed_value_is_a_usage_error() {
        let shared = SharedContext::new();
        let err = Input::int("count")
            .update_shared_context(&shared, Some("many"))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Usage { .. }));
    }

    #[test]
    fn test_empty_value_rejected_unless_allowed() {
        let shared = SharedContext::new();
        let err = Input::new("name")
            .update_shared_context(&shared, Some(""))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Usage { .. }));

        let shared = SharedContext::new();
        Input::new("name")
            .with_allow_empty(true)
            .update_shared_context(&shared, Some(""))
            .unwrap();
        assert_eq!(shared.get_input("name"), Some(json!("")));
    }

    #[test]
    fn test_snake_case_alias() {
        let shared = SharedContext::new();
        Input::new("project-name")
            .update_shared_context(&shared, Some("weft"))
            .unwrap();

        assert_eq!(shared.get_input("project-name"), Some(json!("weft")));
        assert_eq!(shared.get_input("project_name"), Some(json!("weft")));
    }

    #[test]
    fn test_duplicate_declaration_is_a_usage_error() {
        let shared = SharedContext::new();
        let input = Input::new("name").with_default("world");
        input.update_shared_context(&shared, None).unwrap();

        let err = input.update_shared_context(&shared, None).unwrap_err();
        assert!(matches!(err, ExecutionError::Usage { .. }));
    }
}
