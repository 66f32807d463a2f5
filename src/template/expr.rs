// ABOUTME: Minimal sandboxed expression evaluator for template placeholders
// ABOUTME: Supports attribute access, indexing, concatenation, whitelisted calls, and literals

use chrono::Local;
use serde_json::Value as JsonValue;

use super::helpers;

/// Read-only view the evaluator uses to resolve `ctx.*` names.
///
/// Implemented by the shared context; kept as a trait so the template
/// module can be exercised without constructing a full session.
pub trait RenderScope {
    fn lookup_input(&self, key: &str) -> Option<JsonValue>;
    fn input_keys(&self) -> Vec<String>;
    fn lookup_env(&self, key: &str) -> Option<String>;
    fn args(&self) -> Vec<JsonValue>;
    fn xcom_peek(&self, slot: &str) -> Option<JsonValue>;
    fn xcom_keys(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Plus,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    StrLit(String),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    NullLit,
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Concat(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Helper {
    ToBoolean,
    ToCamelCase,
    ToHumanCase,
    ToKebabCase,
    ToPascalCase,
    ToSnakeCase,
    DoubleQuote,
}

impl Helper {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "to_boolean" => Some(Self::ToBoolean),
            "to_camel_case" => Some(Self::ToCamelCase),
            "to_human_case" => Some(Self::ToHumanCase),
            "to_kebab_case" => Some(Self::ToKebabCase),
            "to_pascal_case" => Some(Self::ToPascalCase),
            "to_snake_case" => Some(Self::ToSnakeCase),
            "double_quote" => Some(Self::DoubleQuote),
            _ => None,
        }
    }
}

/// Intermediate value produced while walking an expression tree.
enum EvalValue {
    Json(JsonValue),
    Ctx,
    InputNs,
    EnvNs,
    XcomNs,
    Slot(String),
    DateTimeNs,
    HelperFn(Helper),
    SlotPeek(String),
    DateTimeNow,
    DateTimeToday,
}

impl EvalValue {
    fn describe(&self) -> &'static str {
        match self {
            EvalValue::Json(_) => "value",
            EvalValue::Ctx => "ctx",
            EvalValue::InputNs => "ctx.input",
            EvalValue::EnvNs => "ctx.env",
            EvalValue::XcomNs => "ctx.xcom",
            EvalValue::Slot(_) => "xcom slot",
            EvalValue::DateTimeNs => "datetime",
            EvalValue::HelperFn(_) => "helper function",
            EvalValue::SlotPeek(_) | EvalValue::DateTimeNow | EvalValue::DateTimeToday => "method",
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some(other) => literal.push(other),
                            None => return Err("unterminated escape in string literal".into()),
                        }
                    } else if c == quote {
                        closed = true;
                        break;
                    } else {
                        literal.push(c);
                    }
                }
                if !closed {
                    return Err("unterminated string literal".into());
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                let mut is_float = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        number.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        // Lookahead: `1.x` is attribute access on an int, not a float.
                        let mut ahead = chars.clone();
                        ahead.next();
                        match ahead.peek() {
                            Some(d) if d.is_ascii_digit() => {
                                is_float = true;
                                number.push(c);
                                chars.next();
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    tokens.push(Token::Float(
                        number.parse().map_err(|_| format!("bad float literal {number:?}"))?,
                    ));
                } else {
                    tokens.push(Token::Int(
                        number.parse().map_err(|_| format!("bad int literal {number:?}"))?,
                    ));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_postfix()?;
        while matches!(self.peek(), Some(Token::Plus)) {
            self.next();
            let right = self.parse_postfix()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(name)) => {
                            expr = Expr::Attr(Box::new(expr), name);
                        }
                        other => return Err(format!("expected attribute name, found {other:?}")),
                    }
                }
                Some(Token::LBracket) => {
                    self.next();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Token::LParen) => {
                    self.next();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.next();
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::StrLit(s)),
            Some(Token::Int(i)) => Ok(Expr::IntLit(i)),
            Some(Token::Float(f)) => Ok(Expr::FloatLit(f)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::BoolLit(true)),
                "false" => Ok(Expr::BoolLit(false)),
                "null" | "none" => Ok(Expr::NullLit),
                _ => Ok(Expr::Name(name)),
            },
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("empty expression".into()),
        }
    }
}

pub(crate) fn parse(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "trailing tokens after expression: {:?}",
            &parser.tokens[parser.pos..]
        ));
    }
    Ok(expr)
}

/// Evaluate a parsed expression against the scope, producing a display string.
pub(crate) fn evaluate(expr: &Expr, scope: &dyn RenderScope) -> Result<String, String> {
    let value = eval(expr, scope)?;
    match value {
        EvalValue::Json(json) => Ok(json_to_display(&json)),
        other => Err(format!("{} cannot be rendered as a string", other.describe())),
    }
}

fn json_to_display(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval(expr: &Expr, scope: &dyn RenderScope) -> Result<EvalValue, String> {
    match expr {
        Expr::StrLit(s) => Ok(EvalValue::Json(JsonValue::String(s.clone()))),
        Expr::IntLit(i) => Ok(EvalValue::Json(JsonValue::from(*i))),
        Expr::FloatLit(f) => Ok(EvalValue::Json(JsonValue::from(*f))),
        Expr::BoolLit(b) => Ok(EvalValue::Json(JsonValue::Bool(*b))),
        Expr::NullLit => Ok(EvalValue::Json(JsonValue::Null)),
        Expr::Name(name) => eval_name(name),
        Expr::Attr(base, attr) => eval_attr(eval(base, scope)?, attr, scope),
        Expr::Index(base, index) => {
            let base = eval(base, scope)?;
            let index = eval(index, scope)?;
            eval_index(base, index, scope)
        }
        Expr::Call(callee, args) => {
            let callee = eval(callee, scope)?;
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, scope)?);
            }
            eval_call(callee, evaluated, scope)
        }
        Expr::Concat(left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            eval_concat(left, right)
        }
    }
}

fn eval_name(name: &str) -> Result<EvalValue, String> {
    if name == "ctx" {
        return Ok(EvalValue::Ctx);
    }
    if name == "datetime" {
        return Ok(EvalValue::DateTimeNs);
    }
    if let Some(helper) = Helper::from_name(name) {
        return Ok(EvalValue::HelperFn(helper));
    }
    Err(format!(
        "unknown name {name:?} (available: ctx, datetime, to_boolean, to_camel_case, \
         to_human_case, to_kebab_case, to_pascal_case, to_snake_case, double_quote)"
    ))
}

fn eval_attr(base: EvalValue, attr: &str, scope: &dyn RenderScope) -> Result<EvalValue, String> {
    match base {
        EvalValue::Ctx => match attr {
            "input" => Ok(EvalValue::InputNs),
            "env" => Ok(EvalValue::EnvNs),
            "xcom" => Ok(EvalValue::XcomNs),
            "args" => Ok(EvalValue::Json(JsonValue::Array(scope.args()))),
            other => Err(format!(
                "ctx has no attribute {other:?} (available: input, env, args, xcom)"
            )),
        },
        EvalValue::InputNs => lookup_input(attr, scope),
        EvalValue::EnvNs => lookup_env(attr, scope),
        EvalValue::XcomNs => Ok(EvalValue::Slot(attr.to_string())),
        EvalValue::Slot(slot) => match attr {
            "peek" => Ok(EvalValue::SlotPeek(slot)),
            other => Err(format!("xcom slot has no attribute {other:?}")),
        },
        EvalValue::DateTimeNs => match attr {
            "now" => Ok(EvalValue::DateTimeNow),
            "today" => Ok(EvalValue::DateTimeToday),
            other => Err(format!("datetime has no attribute {other:?}")),
        },
        EvalValue::Json(JsonValue::Object(map)) => match map.get(attr) {
            Some(value) => Ok(EvalValue::Json(value.clone())),
            None => Err(format!("object has no field {attr:?}")),
        },
        other => Err(format!("{} has no attributes", other.describe())),
    }
}

fn eval_index(
    base: EvalValue,
    index: EvalValue,
    scope: &dyn RenderScope,
) -> Result<EvalValue, String> {
    match (base, index) {
        (EvalValue::InputNs, EvalValue::Json(JsonValue::String(key))) => {
            lookup_input(&key, scope)
        }
        (EvalValue::EnvNs, EvalValue::Json(JsonValue::String(key))) => lookup_env(&key, scope),
        (EvalValue::XcomNs, EvalValue::Json(JsonValue::String(key))) => Ok(EvalValue::Slot(key)),
        (EvalValue::Json(JsonValue::Array(items)), EvalValue::Json(index)) => {
            let i = index
                .as_i64()
                .ok_or_else(|| format!("list index must be an integer, found {index}"))?;
            let i = usize::try_from(i).map_err(|_| format!("list index out of range: {i}"))?;
            items
                .get(i)
                .cloned()
                .map(EvalValue::Json)
                .ok_or_else(|| format!("list index out of range: {i}"))
        }
        (EvalValue::Json(JsonValue::Object(map)), EvalValue::Json(JsonValue::String(key))) => map
            .get(&key)
            .cloned()
            .map(EvalValue::Json)
            .ok_or_else(|| format!("object has no field {key:?}")),
        (base, _) => Err(format!("{} is not indexable", base.describe())),
    }
}

fn eval_call(
    callee: EvalValue,
    args: Vec<EvalValue>,
    scope: &dyn RenderScope,
) -> Result<EvalValue, String> {
    match callee {
        EvalValue::HelperFn(helper) => {
            if args.len() != 1 {
                return Err(format!("helper expects 1 argument, got {}", args.len()));
            }
            let arg = match args.into_iter().next() {
                Some(EvalValue::Json(json)) => json_to_display(&json),
                Some(other) => {
                    return Err(format!("{} cannot be passed to a helper", other.describe()))
                }
                None => return Err("helper expects 1 argument, got 0".to_string()),
            };
            let result = match helper {
                Helper::ToBoolean => {
                    let parsed = helpers::to_boolean(&arg)
                        .ok_or_else(|| format!("{arg:?} is not a boolean"))?;
                    return Ok(EvalValue::Json(JsonValue::Bool(parsed)));
                }
                Helper::ToCamelCase => helpers::to_camel_case(&arg),
                Helper::ToHumanCase => helpers::to_human_case(&arg),
                Helper::ToKebabCase => helpers::to_kebab_case(&arg),
                Helper::ToPascalCase => helpers::to_pascal_case(&arg),
                Helper::ToSnakeCase => helpers::to_snake_case(&arg),
                Helper::DoubleQuote => helpers::double_quote(&arg),
            };
            Ok(EvalValue::Json(JsonValue::String(result)))
        }
        EvalValue::SlotPeek(slot) => match scope.xcom_peek(&slot) {
            Some(value) => Ok(EvalValue::Json(value)),
            None => Err(format!(
                "xcom slot {slot:?} is empty or unknown (available: {})",
                scope.xcom_keys().join(", ")
            )),
        },
        EvalValue::DateTimeNow => Ok(EvalValue::Json(JsonValue::String(
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ))),
        EvalValue::DateTimeToday => Ok(EvalValue::Json(JsonValue::String(
            Local::now().format("%Y-%m-%d").to_string(),
        ))),
        other => Err(format!("{} is not callable", other.describe())),
    }
}

fn eval_concat(left: EvalValue, right: EvalValue) -> Result<EvalValue, String> {
    let (left, right) = match (left, right) {
        (EvalValue::Json(l), EvalValue::Json(r)) => (l, r),
        (l, _) => return Err(format!("{} does not support '+'", l.describe())),
    };
    match (&left, &right) {
        (JsonValue::String(l), JsonValue::String(r)) => {
            Ok(EvalValue::Json(JsonValue::String(format!("{l}{r}"))))
        }
        (JsonValue::Number(l), JsonValue::Number(r)) => {
            if let (Some(li), Some(ri)) = (l.as_i64(), r.as_i64()) {
                Ok(EvalValue::Json(JsonValue::from(li + ri)))
            } else {
                let lf = l.as_f64().unwrap_or(0.0);
                let rf = r.as_f64().unwrap_or(0.0);
                Ok(EvalValue::Json(JsonValue::from(lf + rf)))
            }
        }
        _ => Err(format!("cannot concatenate {left} and {right}")),
    }
}

fn lookup_input(key: &str, scope: &dyn RenderScope) -> Result<EvalValue, String> {
    match scope.lookup_input(key) {
        Some(value) => Ok(EvalValue::Json(value)),
        None => Err(format!(
            "unknown input {key:?} (declared inputs: {})",
            scope.input_keys().join(", ")
        )),
    }
}

fn lookup_env(key: &str, scope: &dyn RenderScope) -> Result<EvalValue, String> {
    match scope.lookup_env(key) {
        Some(value) => Ok(EvalValue::Json(JsonValue::String(value))),
        None => Err(format!("unknown env {key:?}")),
    }
}
