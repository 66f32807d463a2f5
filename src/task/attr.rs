// ABOUTME: Late-bound attribute values resolved against the live shared context
// ABOUTME: An attribute is a literal, a template string, or a callable of the context

use std::sync::Arc;

use crate::context::SharedContext;
use crate::template::Result as TemplateResult;

/// A string-valued attribute: either a literal (rendered as a template
/// when `auto_render` is on) or a callable of the shared context.
#[derive(Clone)]
pub enum StrAttr {
    Value(String),
    Func(Arc<dyn Fn(&SharedContext) -> String + Send + Sync>),
}

impl StrAttr {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&SharedContext) -> String + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    pub fn resolve(&self, shared: &SharedContext, auto_render: bool) -> TemplateResult<String> {
        match self {
            StrAttr::Value(value) if auto_render => shared.render(value),
            StrAttr::Value(value) => Ok(value.clone()),
            StrAttr::Func(f) => Ok(f(shared)),
        }
    }
}

impl From<&str> for StrAttr {
    fn from(value: &str) -> Self {
        StrAttr::Value(value.to_string())
    }
}

impl From<String> for StrAttr {
    fn from(value: String) -> Self {
        StrAttr::Value(value)
    }
}

impl std::fmt::Debug for StrAttr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrAttr::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StrAttr::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// A boolean attribute: a literal, a template string rendered to a
/// boolean, or a callable of the shared context.
#[derive(Clone)]
pub enum BoolAttr {
    Value(bool),
    Template(String),
    Func(Arc<dyn Fn(&SharedContext) -> bool + Send + Sync>),
}

impl BoolAttr {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&SharedContext) -> bool + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    pub fn resolve(&self, shared: &SharedContext) -> TemplateResult<bool> {
        match self {
            BoolAttr::Value(value) => Ok(*value),
            BoolAttr::Template(template) => shared.render_bool(template),
            BoolAttr::Func(f) => Ok(f(shared)),
        }
    }
}

impl From<bool> for BoolAttr {
    fn from(value: bool) -> Self {
        BoolAttr::Value(value)
    }
}

impl From<&str> for BoolAttr {
    fn from(value: &str) -> Self {
        BoolAttr::Template(value.to_string())
    }
}

impl From<String> for BoolAttr {
    fn from(value: String) -> Self {
        BoolAttr::Template(value)
    }
}

impl std::fmt::Debug for BoolAttr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoolAttr::Value(value) => f.debug_tuple("Value").field(value).finish(),
            BoolAttr::Template(template) => f.debug_tuple("Template").field(template).finish(),
            BoolAttr::Func(_) => f.write_str("Func(..)"),
        }
    }
}
