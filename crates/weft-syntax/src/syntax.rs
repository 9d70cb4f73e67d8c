//! Configurable pieces of the template grammar.

/// Delimiter and whitespace configuration for the lexer.
///
/// All delimiters are free-form strings so templates can be embedded in
/// host formats that already use `{{` or `{%` (LaTeX, other template
/// languages, terminal control sequences).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    /// Marks the beginning of a block statement. Defaults to `{%`.
    pub block_start: String,
    /// Marks the end of a block statement. Defaults to `%}`.
    pub block_end: String,
    /// Marks the beginning of a print expression. Defaults to `{{`.
    pub variable_start: String,
    /// Marks the end of a print expression. Defaults to `}}`.
    pub variable_end: String,
    /// Marks the beginning of a comment. Defaults to `{#`.
    pub comment_start: String,
    /// Marks the end of a comment. Defaults to `#}`.
    pub comment_end: String,
    /// When set, a line whose first non-whitespace content is this prefix
    /// lexes as a block statement reaching to the end of the line.
    pub line_statement_prefix: Option<String>,
    /// When true, the first newline after a block tag is removed.
    /// Applies to block tags only, not variable tags.
    pub trim_blocks: bool,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            block_start: "{%".to_string(),
            block_end: "%}".to_string(),
            variable_start: "{{".to_string(),
            variable_end: "}}".to_string(),
            comment_start: "{#".to_string(),
            comment_end: "#}".to_string(),
            line_statement_prefix: None,
            trim_blocks: false,
        }
    }
}
