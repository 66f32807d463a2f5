// ABOUTME: Error types for template parsing and rendering
// ABOUTME: Defines render, type-coercion, and expression evaluation errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to render template {template:?}: {cause}")]
    RenderError { template: String, cause: String },

    #[error("template syntax error in {template:?}: {message}")]
    SyntaxError { template: String, message: String },

    #[error("rendered value {value:?} is not a valid {expected}")]
    TypeError { value: String, expected: &'static str },
}

pub type Result<T> = std::result::Result<T, TemplateError>;
