//! Tokenizer for template source.
//!
//! The tokenizer is a single forward pass over the source text. Outside of
//! tags it scans for the next delimiter (or line statement prefix) and emits
//! the intervening text verbatim; inside tags it emits names, literals, and
//! operators until the closing delimiter. It is an [`Iterator`] and is not
//! restartable: after yielding an error it fuses and yields nothing more.

use crate::error::SyntaxError;
use crate::syntax::Syntax;
use crate::tokens::{Operator, Token, TokenKind};

/// Which kind of tag the tokenizer is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Variable,
    Block,
    /// A block statement introduced by the line statement prefix.
    /// Terminated by the end of the line instead of a closing delimiter.
    LineStatement,
}

/// Which opening delimiter was found during a text scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Variable,
    Block,
    Comment,
}

/// Streaming tokenizer over template source.
///
/// Yields `Result<Token, SyntaxError>` items. The stream is single-pass;
/// collect it or feed it to the parser, but do not expect to rewind.
pub struct Tokenizer<'s> {
    source: &'s str,
    filename: Option<&'s str>,
    syntax: Syntax,
    pos: usize,
    line: usize,
    in_tag: Option<TagKind>,
    /// Set when a block tag closed and `trim_blocks` wants the following
    /// newline removed.
    trim_newline: bool,
    failed: bool,
}

impl<'s> Tokenizer<'s> {
    pub fn new(source: &'s str, filename: Option<&'s str>, syntax: &Syntax) -> Self {
        Self {
            source,
            filename,
            syntax: syntax.clone(),
            pos: 0,
            line: 1,
            in_tag: None,
            trim_newline: false,
            failed: false,
        }
    }

    fn err(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.line, self.filename)
    }

    fn bump_lines(&mut self, consumed: &str) {
        self.line += consumed.bytes().filter(|&b| b == b'\n').count();
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.source.as_bytes()[self.pos - 1] == b'\n'
    }

    /// Finds the earliest opening delimiter in `rest`. On a tie (one
    /// delimiter being a prefix of another) the longer one wins.
    fn find_delimiter(&self, rest: &str) -> Option<(usize, Marker)> {
        let candidates = [
            (self.syntax.block_start.as_str(), Marker::Block),
            (self.syntax.variable_start.as_str(), Marker::Variable),
            (self.syntax.comment_start.as_str(), Marker::Comment),
        ];
        let mut best: Option<(usize, Marker, usize)> = None;
        for (delim, marker) in candidates {
            if delim.is_empty() {
                continue;
            }
            if let Some(offset) = rest.find(delim) {
                let better = match best {
                    None => true,
                    Some((b_off, _, b_len)) => {
                        offset < b_off || (offset == b_off && delim.len() > b_len)
                    }
                };
                if better {
                    best = Some((offset, marker, delim.len()));
                }
            }
        }
        best.map(|(offset, marker, _)| (offset, marker))
    }

    /// Finds the next line statement at or after the current position but
    /// before `limit`. Returns `(line_start, statement_start)` offsets into
    /// `rest`, where `statement_start` sits just past the prefix.
    fn find_line_statement(&self, rest: &str, limit: usize) -> Option<(usize, usize)> {
        let prefix = self.syntax.line_statement_prefix.as_deref()?;
        let check = |line_start: usize| -> Option<(usize, usize)> {
            let tail = &rest[line_start..];
            let trimmed = tail.trim_start_matches(|c: char| c == ' ' || c == '\t');
            let ws = tail.len() - trimmed.len();
            if trimmed.starts_with(prefix) {
                Some((line_start, line_start + ws + prefix.len()))
            } else {
                None
            }
        };
        if self.at_line_start() {
            if let Some(hit) = check(0) {
                return Some(hit);
            }
        }
        let mut search = 0;
        while let Some(newline) = rest[search..].find('\n') {
            let line_start = search + newline + 1;
            if line_start > limit || line_start >= rest.len() {
                break;
            }
            if let Some(hit) = check(line_start) {
                return Some(hit);
            }
            search = line_start;
        }
        None
    }

    fn next_in_text(&mut self) -> Option<Result<Token, SyntaxError>> {
        loop {
            if self.trim_newline {
                self.trim_newline = false;
                let rest = &self.source[self.pos..];
                if rest.starts_with("\r\n") {
                    self.pos += 2;
                    self.line += 1;
                } else if rest.starts_with('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
            }
            if self.pos >= self.source.len() {
                return None;
            }

            let rest = &self.source[self.pos..];
            let delimiter = self.find_delimiter(rest);
            let limit = delimiter.map(|(offset, _)| offset).unwrap_or(rest.len());
            let statement = self.find_line_statement(rest, limit);

            // A line statement that starts no later than the delimiter wins:
            // its whole line belongs to the statement.
            let boundary = match (delimiter, statement) {
                (Some((d_off, _)), Some((line_start, _))) if line_start <= d_off => line_start,
                (None, Some((line_start, _))) => line_start,
                (Some((d_off, _)), _) => d_off,
                (None, None) => rest.len(),
            };

            if boundary > 0 {
                let text = &rest[..boundary];
                let token = Token::new(TokenKind::Text(text.to_string()), self.line);
                self.bump_lines(text);
                self.pos += boundary;
                return Some(Ok(token));
            }

            // Something starts right here.
            if let Some((line_start, statement_start)) = statement {
                if delimiter.map(|(d_off, _)| line_start <= d_off).unwrap_or(true) {
                    self.pos += statement_start;
                    self.in_tag = Some(TagKind::LineStatement);
                    return Some(Ok(Token::new(TokenKind::BlockBegin, self.line)));
                }
            }
            match delimiter {
                Some((_, Marker::Block)) => {
                    self.pos += self.syntax.block_start.len();
                    self.in_tag = Some(TagKind::Block);
                    return Some(Ok(Token::new(TokenKind::BlockBegin, self.line)));
                }
                Some((_, Marker::Variable)) => {
                    self.pos += self.syntax.variable_start.len();
                    self.in_tag = Some(TagKind::Variable);
                    return Some(Ok(Token::new(TokenKind::VariableBegin, self.line)));
                }
                Some((_, Marker::Comment)) => {
                    let body_start = self.pos + self.syntax.comment_start.len();
                    match self.source[body_start..].find(self.syntax.comment_end.as_str()) {
                        Some(offset) => {
                            let end = body_start + offset + self.syntax.comment_end.len();
                            let span = &self.source[self.pos..end];
                            self.line += span.bytes().filter(|&b| b == b'\n').count();
                            self.pos = end;
                            // Comments produce no token; keep scanning.
                        }
                        None => return Some(Err(self.err("unclosed comment"))),
                    }
                }
                None => return None,
            }
        }
    }

    fn next_in_tag(&mut self, kind: TagKind) -> Option<Result<Token, SyntaxError>> {
        loop {
            let rest = &self.source[self.pos..];
            if rest.is_empty() {
                return match kind {
                    TagKind::LineStatement => {
                        self.in_tag = None;
                        Some(Ok(Token::new(TokenKind::BlockEnd, self.line)))
                    }
                    TagKind::Block => Some(Err(self.err(format!(
                        "unexpected end of template, expected '{}'",
                        self.syntax.block_end
                    )))),
                    TagKind::Variable => Some(Err(self.err(format!(
                        "unexpected end of template, expected '{}'",
                        self.syntax.variable_end
                    )))),
                };
            }

            match kind {
                TagKind::Variable if rest.starts_with(self.syntax.variable_end.as_str()) => {
                    let line = self.line;
                    self.pos += self.syntax.variable_end.len();
                    self.in_tag = None;
                    return Some(Ok(Token::new(TokenKind::VariableEnd, line)));
                }
                TagKind::Block if rest.starts_with(self.syntax.block_end.as_str()) => {
                    let line = self.line;
                    self.pos += self.syntax.block_end.len();
                    self.in_tag = None;
                    self.trim_newline = self.syntax.trim_blocks;
                    return Some(Ok(Token::new(TokenKind::BlockEnd, line)));
                }
                TagKind::LineStatement if rest.starts_with('\n') || rest.starts_with("\r\n") => {
                    // The newline is left for the surrounding text, exactly
                    // as it would be after a `%}`.
                    self.in_tag = None;
                    self.trim_newline = self.syntax.trim_blocks;
                    return Some(Ok(Token::new(TokenKind::BlockEnd, self.line)));
                }
                _ => {}
            }

            let Some(c) = rest.chars().next() else {
                continue;
            };
            if c == '\n' {
                self.line += 1;
                self.pos += 1;
                continue;
            }
            if c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }

            let line = self.line;
            let result = if c.is_ascii_alphabetic() || c == '_' {
                Ok(self.scan_name())
            } else if c.is_ascii_digit() {
                self.scan_number()
            } else if c == '"' || c == '\'' {
                self.scan_string(c)
            } else {
                self.scan_operator(c)
            };
            return Some(result.map(|kind| Token::new(kind, line)));
        }
    }

    fn scan_name(&mut self) -> TokenKind {
        let rest = &self.source[self.pos..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        let name = rest[..end].to_string();
        self.pos += end;
        TokenKind::Name(name)
    }

    fn scan_number(&mut self) -> Result<TokenKind, SyntaxError> {
        let rest = &self.source[self.pos..];
        let bytes = rest.as_bytes();
        let mut end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let mut is_float = false;
        if end < bytes.len()
            && bytes[end] == b'.'
            && bytes.get(end + 1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            let fraction = &rest[end + 1..];
            let fraction_end = fraction
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(fraction.len());
            end += 1 + fraction_end;
        }
        let text = &rest[..end];
        let kind = if is_float {
            match text.parse::<f64>() {
                Ok(value) => TokenKind::Float(value),
                Err(_) => return Err(self.err(format!("invalid float literal '{text}'"))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => TokenKind::Int(value),
                Err(_) => return Err(self.err(format!("integer literal '{text}' out of range"))),
            }
        };
        self.pos += end;
        Ok(kind)
    }

    fn scan_string(&mut self, quote: char) -> Result<TokenKind, SyntaxError> {
        let mut out = String::new();
        let mut chars = self.source[self.pos + 1..].char_indices();
        loop {
            match chars.next() {
                None => return Err(self.err("unterminated string literal")),
                Some((offset, c)) if c == quote => {
                    self.pos += 1 + offset + c.len_utf8();
                    return Ok(TokenKind::Str(out));
                }
                Some((_, '\n')) => return Err(self.err("unterminated string literal")),
                Some((_, '\\')) => match chars.next() {
                    None => return Err(self.err("unterminated string literal")),
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '\'')) => out.push('\''),
                    Some((_, '"')) => out.push('"'),
                    Some((_, other)) => {
                        return Err(self.err(format!("invalid escape sequence '\\{other}'")))
                    }
                },
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn scan_operator(&mut self, c: char) -> Result<TokenKind, SyntaxError> {
        let rest = &self.source[self.pos..];
        let two_char = [
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            ("<=", Operator::Le),
            (">=", Operator::Ge),
            ("//", Operator::FloorDiv),
        ];
        for (repr, op) in two_char {
            if rest.starts_with(repr) {
                self.pos += 2;
                return Ok(TokenKind::Op(op));
            }
        }
        let op = match c {
            '+' => Operator::Add,
            '-' => Operator::Sub,
            '*' => Operator::Mul,
            '/' => Operator::Div,
            '%' => Operator::Mod,
            '<' => Operator::Lt,
            '>' => Operator::Gt,
            '|' => Operator::Pipe,
            '.' => Operator::Dot,
            ',' => Operator::Comma,
            '(' => Operator::LParen,
            ')' => Operator::RParen,
            '[' => Operator::LBracket,
            ']' => Operator::RBracket,
            other => return Err(self.err(format!("unexpected character {other:?}"))),
        };
        self.pos += c.len_utf8();
        Ok(TokenKind::Op(op))
    }
}

impl<'s> Iterator for Tokenizer<'s> {
    type Item = Result<Token, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.in_tag {
            None => self.next_in_text(),
            Some(kind) => self.next_in_tag(kind),
        };
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}
