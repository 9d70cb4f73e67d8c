//! Syntax error type shared by the lexer and parser.

use thiserror::Error;

/// Error raised when template source fails to lex or parse.
///
/// Carries the line number the problem was detected on and, when the
/// template came from a named source, the template name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (in {} on line {line})", .filename.as_deref().unwrap_or("<string>"))]
pub struct SyntaxError {
    /// Human readable description of the problem.
    pub message: String,
    /// 1-based line the error was detected on.
    pub line: usize,
    /// Name of the template, if it has one.
    pub filename: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, filename: Option<&str>) -> Self {
        Self {
            message: message.into(),
            line,
            filename: filename.map(str::to_string),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyntaxError>;
