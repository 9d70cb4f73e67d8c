//! Error types for compilation and rendering.

use thiserror::Error;
use weft_syntax::SyntaxError;

/// Anything that can go wrong while building or rendering a template.
#[derive(Debug, Error)]
pub enum WeftError {
    /// The template source could not be tokenized or parsed.
    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    /// The environment or a render call was set up inconsistently.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A template referenced a filter that was never registered.
    #[error("no filter named '{name}'")]
    UnknownFilter { name: String },

    /// A template referenced a test that was never registered.
    #[error("no test named '{name}'")]
    UnknownTest { name: String },

    /// The loader had no template under the requested name.
    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    /// An undefined value was used under the strict policy.
    #[error("'{key}' is undefined")]
    Undefined { key: String },

    /// An operation was applied to values that do not support it.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A loader failed to read template source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WeftError>;
