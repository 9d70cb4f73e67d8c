//! Lexer, AST, and parser for the weft template language.
//!
//! This crate turns template source into an arena-backed syntax tree.
//! It knows nothing about rendering: the `weft` crate consumes the
//! [`Parsed`] output, optimizes it, and compiles it for execution.
//!
//! # Example
//!
//! ```rust
//! use weft_syntax::{parse, Node, Syntax};
//!
//! let parsed = parse("Hello {{ name }}!", None, &Syntax::default()).unwrap();
//! let Node::Output(children) = parsed.ast.node(parsed.root) else {
//!     unreachable!("the root is always an Output node");
//! };
//! assert_eq!(children.len(), 3);
//! ```
//!
//! # Grammar Configuration
//!
//! All delimiters are configurable through [`Syntax`]: block tags
//! (`{% %}`), variable tags (`{{ }}`), comments (`{# #}`), an optional
//! line statement prefix, and `trim_blocks` newline handling. The lexer
//! treats delimiter text inside comments as literal.

mod ast;
mod error;
mod lexer;
mod parser;
mod syntax;
mod tokens;

pub use ast::{Ast, BinOp, Const, Node, NodeId, Parsed, UnaryOpKind};
pub use error::{Result, SyntaxError};
pub use lexer::Tokenizer;
pub use parser::{parse, Parser};
pub use syntax::Syntax;
pub use tokens::{Operator, Token, TokenKind};
