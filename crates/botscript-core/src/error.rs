//! Error types for parsing and executing command scripts.
//!
//! Parsing fails with a [`ParseError`] that always points at a source line.
//! Execution fails with an [`ExecError`], which the executor folds into the
//! [`ErrorDetail`] carried by an [`ExecutionResult`](crate::executor::ExecutionResult).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A grammar error in script source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error at line {line}: {message}")]
pub struct ParseError {
    /// 1-based line of the offending token.
    pub line: usize,
    /// Text of the offending source line, without its trailing newline.
    pub source_line: String,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    /// Builds an error for `line`, copying that line's text out of `source`.
    pub fn at(source: &str, line: usize, message: impl Into<String>) -> Self {
        let source_line = source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or_default()
            .trim_end_matches('\r')
            .to_string();
        Self {
            line,
            source_line,
            message: message.into(),
        }
    }
}

/// A runtime failure that aborts script execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// A bare identifier named a variable that was never `set`.
    #[error("Undefined variable '{name}' at line {line}")]
    UndefinedVariable { name: String, line: usize },

    /// A `$(name)` reference or function call matched nothing.
    #[error("Undefined reference '{name}' at line {line}")]
    UndefinedReference { name: String, line: usize },

    /// Operand types do not fit the operation.
    #[error("Type error at line {line}: {message}")]
    Type { message: String, line: usize },

    /// A built-in function was called with the wrong number of arguments.
    #[error("{function}() at line {line}: {message}")]
    Arity {
        function: String,
        message: String,
        line: usize,
    },

    /// `set` tried to bind a name reserved for a builtin.
    #[error("Cannot set '{name}' at line {line}: name is reserved for a builtin")]
    NamingConflict { name: String, line: usize },
}

impl ExecError {
    /// Line of the statement that failed.
    pub fn line(&self) -> usize {
        match self {
            ExecError::UndefinedVariable { line, .. }
            | ExecError::UndefinedReference { line, .. }
            | ExecError::Type { line, .. }
            | ExecError::Arity { line, .. }
            | ExecError::NamingConflict { line, .. } => *line,
        }
    }

    /// The variable, builtin or function name involved, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            ExecError::UndefinedVariable { name, .. }
            | ExecError::UndefinedReference { name, .. }
            | ExecError::NamingConflict { name, .. } => Some(name),
            ExecError::Arity { function, .. } => Some(function),
            ExecError::Type { .. } => None,
        }
    }
}

/// Failure description attached to an unsuccessful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    pub message: String,
}

impl From<&ExecError> for ErrorDetail {
    fn from(err: &ExecError) -> Self {
        Self {
            line: Some(err.line()),
            variable_name: err.name().map(str::to_string),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_captures_source_line() {
        let err = ParseError::at("send \"a\"\nwhen 1 then\n", 2, "missing end");
        assert_eq!(err.line, 2);
        assert_eq!(err.source_line, "when 1 then");
        assert_eq!(err.to_string(), "Parse error at line 2: missing end");
    }

    #[test]
    fn test_parse_error_line_past_end() {
        let err = ParseError::at("", 1, "empty script");
        assert_eq!(err.source_line, "");
    }

    #[test]
    fn test_exec_error_detail() {
        let err = ExecError::UndefinedVariable { name: "nope".to_string(), line: 3 };
        let detail = ErrorDetail::from(&err);
        assert_eq!(detail.line, Some(3));
        assert_eq!(detail.variable_name.as_deref(), Some("nope"));
        assert!(detail.message.contains("nope"));
    }

    #[test]
    fn test_type_error_has_no_name() {
        let err = ExecError::Type { message: "bad".to_string(), line: 1 };
        assert_eq!(err.name(), None);
        assert_eq!(err.line(), 1);
    }
}
