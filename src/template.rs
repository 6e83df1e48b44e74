//! Command templates in Go `text/template` syntax, rendered by `gtmpl`.
//!
//! This module only knows about the template language. The values a template
//! sees and the helpers it may call are supplied by the caller.

use gtmpl::{
    error::{ExecError, ParseError},
    Context, Func, FuncError, Template, Value,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("template parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("template execution error: {reason}")]
    Exec { reason: String },
}

impl RenderError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        RenderError::Parse {
            line,
            reason: reason.into(),
        }
    }

    pub fn exec(reason: impl Into<String>) -> Self {
        RenderError::Exec {
            reason: reason.into(),
        }
    }

    /// Short human-readable reason, fit to show in chat.
    pub fn reason(&self) -> &str {
        match self {
            RenderError::Parse { reason, .. } => reason,
            RenderError::Exec { reason } => reason,
        }
    }
}

impl From<ParseError> for RenderError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::WithContext(context, message) => RenderError::parse(context.line, message),
            ParseError::UnexpectedEnd => RenderError::parse(0, "unexpected end of template"),
            other => RenderError::parse(0, other.to_string()),
        }
    }
}

impl From<ExecError> for RenderError {
    fn from(e: ExecError) -> Self {
        let reason = match e {
            ExecError::NoFiledFor(field, _) => format!("can't evaluate field {field}"),
            ExecError::NotAFunctionButArguments(field) => {
                format!("{field} is not a method but has arguments")
            }
            ExecError::UndefinedFunction(name) => format!("function {name:?} not defined"),
            ExecError::InvalidRange(value) => format!("can't range over {}", kind(&value)),
            ExecError::OnlyMapsAndObjectsHaveFields => "only objects have fields".to_string(),
            ExecError::FuncError(e) => return RenderError::from(e),
            other => other.to_string(),
        };
        RenderError::exec(reason)
    }
}

impl From<FuncError> for RenderError {
    fn from(e: FuncError) -> Self {
        let reason = match e {
            FuncError::ExactlyXArgs(name, want) => {
                format!("wrong number of args for {name}: want {want}")
            }
            FuncError::AtLeastXArgs(name, want) => format!("{name} needs at least {want} args"),
            FuncError::UnableToConvertFromValue => "argument has the wrong type".to_string(),
            FuncError::Generic(reason) => reason,
            FuncError::Other(e) => format!("{e:#}"),
        };
        RenderError::exec(reason)
    }
}

/// Parses `source`, makes `functions` callable from it and executes it against `data`.
pub fn render<'f>(
    source: &str,
    functions: impl IntoIterator<Item = (&'f str, Func)>,
    data: Value,
) -> Result<String, RenderError> {
    let mut template = Template::default();
    for (name, function) in functions {
        template.add_func(name, function);
    }
    template.parse(source)?;
    Ok(template.render(&Context::from(data))?)
}

/// Plain text of a value. Strings print raw and missing values print nothing.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::NoValue | Value::Nil => String::new(),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::NoValue | Value::Nil => "nil",
        Value::Bool(_) => "bool",
        Value::String(_) => "string",
        Value::Object(_) | Value::Map(_) => "object",
        Value::Array(_) => "list",
        Value::Function(_) => "function",
        Value::Number(_) => "number",
    }
}
