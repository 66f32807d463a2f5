// ABOUTME: Template renderer substituting {expr} placeholders against a render scope
// ABOUTME: Provides string rendering plus typed bool/int/float variants

use super::error::{Result, TemplateError};
use super::expr::{self, RenderScope};
use super::helpers::to_boolean;

/// Stateless renderer for `{expr}` templates.
///
/// Each placeholder is parsed and evaluated against the scope's
/// sandboxed namespace. `{{` and `}}` are literal braces.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    /// Render a template, substituting every `{expr}` placeholder.
    ///
    /// Strings without placeholders pass through unchanged.
    pub fn render(&self, scope: &dyn RenderScope, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        out.push('{');
                        continue;
                    }
                    let source = collect_expression(&mut chars, template)?;
                    let parsed = expr::parse(&source).map_err(|message| {
                        TemplateError::SyntaxError {
                            template: template.to_string(),
                            message,
                        }
                    })?;
                    let rendered = expr::evaluate(&parsed, scope).map_err(|cause| {
                        TemplateError::RenderError {
                            template: template.to_string(),
                            cause,
                        }
                    })?;
                    out.push_str(&rendered);
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        out.push('}');
                    } else {
                        return Err(TemplateError::SyntaxError {
                            template: template.to_string(),
                            message: "single '}' outside a placeholder (use '}}')".to_string(),
                        });
                    }
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    pub fn render_bool(&self, scope: &dyn RenderScope, template: &str) -> Result<bool> {
        let rendered = self.render(scope, template)?;
        to_boolean(&rendered).ok_or(TemplateError::TypeError {
            value: rendered,
            expected: "boolean",
        })
    }

    pub fn render_int(&self, scope: &dyn RenderScope, template: &str) -> Result<i64> {
        let rendered = self.render(scope, template)?;
        rendered.trim().parse().map_err(|_| TemplateError::TypeError {
            value: rendered,
            expected: "integer",
        })
    }

    pub fn render_float(&self, scope: &dyn RenderScope, template: &str) -> Result<f64> {
        let rendered = self.render(scope, template)?;
        rendered.trim().parse().map_err(|_| TemplateError::TypeError {
            value: rendered,
            expected: "float",
        })
    }
}

/// Consume characters up to the closing `}` of a placeholder, skipping
/// over string literals so quoted braces do not end the expression.
fn collect_expression(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    template: &str,
) -> Result<String> {
    let mut source = String::new();
    let mut quote: Option<char> = None;

    for ch in chars.by_ref() {
        match quote {
            Some(q) => {
                source.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '}' => return Ok(source),
                '\'' | '"' => {
                    quote = Some(ch);
                    source.push(ch);
                }
                other => source.push(other),
            },
        }
    }
    Err(TemplateError::SyntaxError {
        template: template.to_string(),
        message: "unterminated '{' placeholder".to_string(),
    })
}
