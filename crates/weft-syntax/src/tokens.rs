//! Token types produced by the tokenizer.

use std::fmt;

/// A single lexed token together with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self { kind, line }
    }
}

/// The different kinds of tokens the lexer emits.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Raw template text between tags.
    Text(String),
    /// Start of a print expression (`{{` by default).
    VariableBegin,
    /// End of a print expression (`}}` by default).
    VariableEnd,
    /// Start of a block statement (`{%` by default).
    BlockBegin,
    /// End of a block statement (`%}` by default).
    BlockEnd,
    /// An identifier or keyword.
    Name(String),
    /// A quoted string literal with escapes resolved.
    Str(String),
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// An operator or punctuation character.
    Op(Operator),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Text(_) => write!(f, "template text"),
            TokenKind::VariableBegin => write!(f, "start of variable tag"),
            TokenKind::VariableEnd => write!(f, "end of variable tag"),
            TokenKind::BlockBegin => write!(f, "start of block tag"),
            TokenKind::BlockEnd => write!(f, "end of block tag"),
            TokenKind::Name(name) => write!(f, "name '{name}'"),
            TokenKind::Str(_) => write!(f, "string literal"),
            TokenKind::Int(value) => write!(f, "integer '{value}'"),
            TokenKind::Float(value) => write!(f, "float '{value}'"),
            TokenKind::Op(op) => write!(f, "'{op}'"),
        }
    }
}

/// Operators and punctuation recognized inside tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Pipe,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::FloorDiv => "//",
            Operator::Mod => "%",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Pipe => "|",
            Operator::Dot => ".",
            Operator::Comma => ",",
            Operator::LParen => "(",
            Operator::RParen => ")",
            Operator::LBracket => "[",
            Operator::RBracket => "]",
        };
        write!(f, "{repr}")
    }
}
