//! Recursive-descent parser with a Pratt expression core.
//!
//! Statements (`if`, `for`, `block`, `extends`) are parsed by recursive
//! descent; expressions use binding powers so precedence lives in one
//! table instead of a grammar-shaped call chain. The parser owns the
//! arena and registers every `block` into the shared block table.

use std::collections::HashMap;

use crate::ast::{Ast, BinOp, Const, Node, NodeId, Parsed, UnaryOpKind};
use crate::error::{Result, SyntaxError};
use crate::lexer::Tokenizer;
use crate::syntax::Syntax;
use crate::tokens::{Operator, Token, TokenKind};

/// Left and right binding power of an infix operator.
///
/// `left(p)` produces a left-associative operator: the right side binds
/// one step tighter, so `a - b - c` parses as `(a - b) - c`.
#[derive(Debug, Clone, Copy)]
struct BindingPower {
    left: u8,
    right: u8,
}

impl BindingPower {
    const fn left(power: u8) -> Self {
        Self {
            left: power,
            right: power + 1,
        }
    }
}

/// Binding powers, lowest to highest.
mod prec {
    use super::BindingPower;

    pub const OR: BindingPower = BindingPower::left(1);
    pub const AND: BindingPower = BindingPower::left(3);
    /// Prefix `not`; comparisons bind tighter, so `not a == b`
    /// negates the whole comparison.
    pub const NOT: u8 = 5;
    pub const COMPARE: BindingPower = BindingPower::left(7);
    pub const ADD: BindingPower = BindingPower::left(9);
    pub const MUL: BindingPower = BindingPower::left(11);
    /// Prefix `-`/`+`. Filters bind tighter: `-x|abs` is `-(x|abs)`.
    pub const UNARY: u8 = 13;
    pub const FILTER: BindingPower = BindingPower::left(15);
    pub const POSTFIX: u8 = 17;
}

/// What the next token means in infix position.
#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary(BinOp, BindingPower),
    Is,
    Pipe,
    Dot,
    Subscript,
    Call,
}

fn classify_infix(token: &Token) -> Option<Infix> {
    match &token.kind {
        TokenKind::Op(op) => match op {
            Operator::Add => Some(Infix::Binary(BinOp::Add, prec::ADD)),
            Operator::Sub => Some(Infix::Binary(BinOp::Sub, prec::ADD)),
            Operator::Mul => Some(Infix::Binary(BinOp::Mul, prec::MUL)),
            Operator::Div => Some(Infix::Binary(BinOp::Div, prec::MUL)),
            Operator::FloorDiv => Some(Infix::Binary(BinOp::FloorDiv, prec::MUL)),
            Operator::Mod => Some(Infix::Binary(BinOp::Mod, prec::MUL)),
            Operator::Eq => Some(Infix::Binary(BinOp::Eq, prec::COMPARE)),
            Operator::Ne => Some(Infix::Binary(BinOp::Ne, prec::COMPARE)),
            Operator::Lt => Some(Infix::Binary(BinOp::Lt, prec::COMPARE)),
            Operator::Le => Some(Infix::Binary(BinOp::Le, prec::COMPARE)),
            Operator::Gt => Some(Infix::Binary(BinOp::Gt, prec::COMPARE)),
            Operator::Ge => Some(Infix::Binary(BinOp::Ge, prec::COMPARE)),
            Operator::Pipe => Some(Infix::Pipe),
            Operator::Dot => Some(Infix::Dot),
            Operator::LBracket => Some(Infix::Subscript),
            Operator::LParen => Some(Infix::Call),
            _ => None,
        },
        TokenKind::Name(name) => match name.as_str() {
            "or" => Some(Infix::Binary(BinOp::Or, prec::OR)),
            "and" => Some(Infix::Binary(BinOp::And, prec::AND)),
            "is" => Some(Infix::Is),
            _ => None,
        },
        _ => None,
    }
}

/// Parses template source into an arena, a root node, and the block table.
pub fn parse(source: &str, filename: Option<&str>, syntax: &Syntax) -> Result<Parsed> {
    Parser::new(source, filename, syntax).parse()
}

/// Template parser. Consumes a [`Tokenizer`] and builds the [`Parsed`]
/// result; use [`parse`] unless you need to hold the parser itself.
pub struct Parser<'s> {
    tokens: Tokenizer<'s>,
    lookahead: Option<Token>,
    ast: Ast,
    blocks: HashMap<String, NodeId>,
    filename: Option<&'s str>,
    /// Line of the most recently consumed token.
    line: usize,
    /// Currently open statement tags, innermost last, for error messages.
    open_tags: Vec<(String, usize)>,
    extends_seen: bool,
    saw_statement: bool,
}

impl<'s> Parser<'s> {
    pub fn new(source: &'s str, filename: Option<&'s str>, syntax: &Syntax) -> Self {
        Self {
            tokens: Tokenizer::new(source, filename, syntax),
            lookahead: None,
            ast: Ast::new(),
            blocks: HashMap::new(),
            filename,
            line: 1,
            open_tags: Vec::new(),
            extends_seen: false,
            saw_statement: false,
        }
    }

    pub fn parse(mut self) -> Result<Parsed> {
        let (children, _) = self.subparse(&[])?;
        let root = self.ast.push(Node::Output(children), 1);
        Ok(Parsed {
            ast: self.ast,
            root,
            blocks: self.blocks,
        })
    }

    // ---- token plumbing ----

    fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.lookahead.take() {
            self.line = token.line;
            return Ok(Some(token));
        }
        match self.tokens.next() {
            Some(Ok(token)) => {
                self.line = token.line;
                Ok(Some(token))
            }
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>> {
        if self.lookahead.is_none() {
            self.lookahead = match self.tokens.next() {
                Some(Ok(token)) => Some(token),
                Some(Err(err)) => return Err(err),
                None => None,
            };
        }
        Ok(self.lookahead.as_ref())
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.line, self.filename)
    }

    fn expect_name(&mut self, what: &str) -> Result<String> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::Name(name),
                ..
            }) => Ok(name),
            Some(token) => Err(self.error(format!("expected {what}, got {}", token.kind))),
            None => Err(self.error(format!("unexpected end of template, expected {what}"))),
        }
    }

    fn expect_op(&mut self, op: Operator) -> Result<()> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::Op(found),
                ..
            }) if found == op => Ok(()),
            Some(token) => Err(self.error(format!("expected '{op}', got {}", token.kind))),
            None => Err(self.error(format!("unexpected end of template, expected '{op}'"))),
        }
    }

    fn eat_op(&mut self, op: Operator) -> Result<bool> {
        let matches = matches!(
            self.peek()?,
            Some(Token {
                kind: TokenKind::Op(found),
                ..
            }) if *found == op
        );
        if matches {
            self.next_token()?;
        }
        Ok(matches)
    }

    fn expect_block_end(&mut self) -> Result<()> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::BlockEnd,
                ..
            }) => Ok(()),
            Some(token) => Err(self.error(format!(
                "expected end of block tag, got {}",
                token.kind
            ))),
            None => Err(self.error("unexpected end of template, expected end of block tag")),
        }
    }

    fn expect_variable_end(&mut self) -> Result<()> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::VariableEnd,
                ..
            }) => Ok(()),
            Some(token) => Err(self.error(format!(
                "expected end of variable tag, got {}",
                token.kind
            ))),
            None => Err(self.error("unexpected end of template, expected end of variable tag")),
        }
    }

    // ---- statements ----

    /// Parses statements and output until one of `end_tags` (or the end of
    /// the template when `end_tags` is empty). Returns the children in
    /// order and the end tag that stopped the scan; the caller consumes
    /// the rest of that closing tag.
    fn subparse(&mut self, end_tags: &[&str]) -> Result<(Vec<NodeId>, Option<String>)> {
        let mut children = Vec::new();
        loop {
            let Some(token) = self.next_token()? else {
                if end_tags.is_empty() {
                    return Ok((children, None));
                }
                let context = self
                    .open_tags
                    .last()
                    .map(|(tag, line)| format!("'{tag}' tag started on line {line}"))
                    .unwrap_or_else(|| "tag".to_string());
                return Err(self.error(format!(
                    "unexpected end of template, unclosed {context}"
                )));
            };
            match token.kind {
                TokenKind::Text(text) => {
                    let id = self.ast.push(Node::Text(text), token.line);
                    children.push(id);
                }
                TokenKind::VariableBegin => {
                    let expr = self.parse_expression()?;
                    self.expect_variable_end()?;
                    children.push(expr);
                }
                TokenKind::BlockBegin => {
                    let tag = self.expect_name("statement name")?;
                    if end_tags.contains(&tag.as_str()) {
                        return Ok((children, Some(tag)));
                    }
                    let top_level = end_tags.is_empty();
                    let id = self.parse_statement(&tag, top_level)?;
                    children.push(id);
                }
                other => return Err(self.error(format!("unexpected {other}"))),
            }
        }
    }

    fn parse_statement(&mut self, tag: &str, top_level: bool) -> Result<NodeId> {
        match tag {
            "if" => {
                self.saw_statement = true;
                self.parse_if()
            }
            "for" => {
                self.saw_statement = true;
                self.parse_for()
            }
            "block" => {
                self.saw_statement = true;
                self.parse_block()
            }
            "extends" => self.parse_extends(top_level),
            "else" | "elif" | "endif" | "endfor" | "endblock" => {
                match self.open_tags.last() {
                    Some((open, line)) => Err(self.error(format!(
                        "unexpected '{tag}', expected 'end{open}' (for '{open}' started on line {line})"
                    ))),
                    None => Err(self.error(format!("unexpected '{tag}', no tag is open"))),
                }
            }
            unknown => Err(self.error(format!("unknown statement tag '{unknown}'"))),
        }
    }

    fn parse_if(&mut self) -> Result<NodeId> {
        let line = self.line;
        self.open_tags.push(("if".to_string(), line));
        let cond = self.parse_expression()?;
        self.expect_block_end()?;
        let (then_children, end) = self.subparse(&["elif", "else", "endif"])?;
        let then_body = self.ast.push(Node::Output(then_children), line);
        let else_body = match end.as_deref() {
            // `elif` restarts an if right here; the chain shares one endif.
            Some("elif") => Some(self.parse_if()?),
            Some("else") => {
                self.expect_block_end()?;
                let (else_children, _) = self.subparse(&["endif"])?;
                self.expect_block_end()?;
                Some(self.ast.push(Node::Output(else_children), line))
            }
            _ => {
                self.expect_block_end()?;
                None
            }
        };
        self.open_tags.pop();
        Ok(self.ast.push(
            Node::If {
                cond,
                then_body,
                else_body,
            },
            line,
        ))
    }

    fn parse_for(&mut self) -> Result<NodeId> {
        let line = self.line;
        self.open_tags.push(("for".to_string(), line));
        let var = self.expect_name("loop variable name")?;
        let keyword = self.expect_name("'in'")?;
        if keyword != "in" {
            return Err(self.error(format!("expected 'in', got '{keyword}'")));
        }
        let iter = self.parse_expression()?;
        self.expect_block_end()?;
        let (body_children, _) = self.subparse(&["endfor"])?;
        self.expect_block_end()?;
        self.open_tags.pop();
        let body = self.ast.push(Node::Output(body_children), line);
        Ok(self.ast.push(Node::For { var, iter, body }, line))
    }

    fn parse_block(&mut self) -> Result<NodeId> {
        let line = self.line;
        let name = self.expect_name("block name")?;
        if self.blocks.contains_key(&name) {
            return Err(self.error(format!("block '{name}' defined twice")));
        }
        self.open_tags.push(("block".to_string(), line));
        self.expect_block_end()?;
        let (body_children, _) = self.subparse(&["endblock"])?;
        // `{% endblock name %}` may repeat the block name.
        if let Some(Token {
            kind: TokenKind::Name(_),
            ..
        }) = self.peek()?
        {
            let close_name = self.expect_name("block name")?;
            if close_name != name {
                return Err(self.error(format!(
                    "mismatched block name in endblock: expected '{name}', got '{close_name}'"
                )));
            }
        }
        self.expect_block_end()?;
        self.open_tags.pop();
        let body = self.ast.push(Node::Output(body_children), line);
        // A same-named block nested inside this one registered first and
        // would be clobbered here.
        if self.blocks.insert(name.clone(), body).is_some() {
            return Err(self.error(format!("block '{name}' defined twice")));
        }
        Ok(self.ast.push(Node::Block { name, body }, line))
    }

    fn parse_extends(&mut self, top_level: bool) -> Result<NodeId> {
        let line = self.line;
        if !top_level {
            return Err(self.error("'extends' is only valid at the top level of a template"));
        }
        if self.extends_seen {
            return Err(self.error("'extends' may only be used once per template"));
        }
        if self.saw_statement {
            return Err(self.error("'extends' must be the first statement in the template"));
        }
        self.extends_seen = true;
        let parent = self.parse_expression()?;
        self.expect_block_end()?;
        Ok(self.ast.push(Node::Extends { parent }, line))
    }

    // ---- expressions ----

    pub(crate) fn parse_expression(&mut self) -> Result<NodeId> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<NodeId> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let infix = match self.peek()? {
                Some(token) => match classify_infix(token) {
                    Some(infix) => infix,
                    None => break,
                },
                None => break,
            };
            let left_bp = match infix {
                Infix::Binary(_, bp) => bp.left,
                Infix::Is => prec::COMPARE.left,
                Infix::Pipe => prec::FILTER.left,
                Infix::Dot | Infix::Subscript | Infix::Call => prec::POSTFIX,
            };
            if left_bp < min_bp {
                break;
            }
            self.next_token()?;
            let line = self.line;
            lhs = match infix {
                Infix::Binary(op, bp) => {
                    let right = self.parse_expr_bp(bp.right)?;
                    self.ast.push(
                        Node::BinaryOp {
                            op,
                            left: lhs,
                            right,
                        },
                        line,
                    )
                }
                Infix::Is => self.parse_test(lhs, line)?,
                Infix::Pipe => self.parse_filter(lhs, line)?,
                Infix::Dot => {
                    let name = self.expect_name("attribute name")?;
                    self.ast.push(Node::Attr { obj: lhs, name }, line)
                }
                Infix::Subscript => {
                    let index = self.parse_expression()?;
                    self.expect_op(Operator::RBracket)?;
                    self.ast.push(Node::Subscript { obj: lhs, index }, line)
                }
                Infix::Call => {
                    let args = self.parse_call_args()?;
                    self.ast.push(Node::Call { callee: lhs, args }, line)
                }
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<NodeId> {
        let Some(token) = self.next_token()? else {
            return Err(self.error("unexpected end of template in expression"));
        };
        let line = token.line;
        match token.kind {
            TokenKind::Int(value) => Ok(self.ast.push(Node::Literal(Const::Int(value)), line)),
            TokenKind::Float(value) => Ok(self.ast.push(Node::Literal(Const::Float(value)), line)),
            TokenKind::Str(value) => Ok(self.ast.push(Node::Literal(Const::Str(value)), line)),
            TokenKind::Name(name) => match name.as_str() {
                "true" | "True" => Ok(self.ast.push(Node::Literal(Const::Bool(true)), line)),
                "false" | "False" => Ok(self.ast.push(Node::Literal(Const::Bool(false)), line)),
                "none" | "None" => Ok(self.ast.push(Node::Literal(Const::None), line)),
                "not" => {
                    let operand = self.parse_expr_bp(prec::NOT)?;
                    Ok(self.ast.push(
                        Node::UnaryOp {
                            op: UnaryOpKind::Not,
                            operand,
                        },
                        line,
                    ))
                }
                _ => Ok(self.ast.push(Node::Name(name), line)),
            },
            TokenKind::Op(Operator::Sub) => {
                let operand = self.parse_expr_bp(prec::UNARY)?;
                Ok(self.ast.push(
                    Node::UnaryOp {
                        op: UnaryOpKind::Neg,
                        operand,
                    },
                    line,
                ))
            }
            TokenKind::Op(Operator::Add) => {
                let operand = self.parse_expr_bp(prec::UNARY)?;
                Ok(self.ast.push(
                    Node::UnaryOp {
                        op: UnaryOpKind::Pos,
                        operand,
                    },
                    line,
                ))
            }
            TokenKind::Op(Operator::LParen) => {
                let inner = self.parse_expression()?;
                self.expect_op(Operator::RParen)?;
                Ok(inner)
            }
            other => Err(self.error(format!("unexpected {other} in expression"))),
        }
    }

    fn parse_test(&mut self, input: NodeId, line: usize) -> Result<NodeId> {
        let negated = matches!(
            self.peek()?,
            Some(Token {
                kind: TokenKind::Name(name),
                ..
            }) if name == "not"
        );
        if negated {
            self.next_token()?;
        }
        let name = self.expect_name("test name")?;
        let args = if self.eat_op(Operator::LParen)? {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        Ok(self.ast.push(
            Node::Test {
                input,
                name,
                args,
                negated,
            },
            line,
        ))
    }

    fn parse_filter(&mut self, input: NodeId, line: usize) -> Result<NodeId> {
        let name = self.expect_name("filter name")?;
        let args = if self.eat_op(Operator::LParen)? {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        Ok(self.ast.push(Node::Filter { input, name, args }, line))
    }

    /// Parses a comma-separated argument list; the opening paren is
    /// already consumed. Consumes through the closing paren.
    fn parse_call_args(&mut self) -> Result<Vec<NodeId>> {
        let mut args = Vec::new();
        if self.eat_op(Operator::RParen)? {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.eat_op(Operator::Comma)? {
                continue;
            }
            self.expect_op(Operator::RParen)?;
            break;
        }
        Ok(args)
    }
}
