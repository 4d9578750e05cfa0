//! Lexer and indentation-aware parser for the capability DSL.
//!
//! The grammar is a deliberately small Python-like surface: one statement
//! per line, four-space-style indentation blocks, and a closed expression
//! set. Anything the lexer or parser cannot shape is a syntax rejection
//! before the sandbox policy is even consulted.

use crate::core::ast::{
    BinOpKind, BoolOpKind, CmpOpKind, Expr, FStringPart, FunctionDef, Module, Stmt, UnaryOpKind,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sym {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Newline,
    Indent,
    Dedent,
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw inner text of an f-string, escapes resolved, braces intact.
    FStr(String),
    Sym(Sym),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    tok: Tok,
    line: usize,
}

const KEYWORDS: &[&str] = &[
    "def", "return", "if", "elif", "else", "for", "in", "while", "break", "continue", "pass",
    "import", "global", "lambda", "and", "or", "not", "True", "False", "None",
];

fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains(&s)
}

// ── Lexer ──────────────────────────────────────────────────────────────

fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        if raw_line.trim().is_empty() {
            continue;
        }
        if raw_line.trim_start().starts_with('#') {
            continue;
        }
        if raw_line.contains('\t') {
            return Err(ParseError::new(line_no, "tab indentation is not supported"));
        }

        let indent = raw_line.len() - raw_line.trim_start_matches(' ').len();
        let current = *indents.last().unwrap();
        if indent > current {
            indents.push(indent);
            tokens.push(Token {
                tok: Tok::Indent,
                line: line_no,
            });
        } else if indent < current {
            while indent < *indents.last().unwrap() {
                indents.pop();
                tokens.push(Token {
                    tok: Tok::Dedent,
                    line: line_no,
                });
            }
            if indent != *indents.last().unwrap() {
                return Err(ParseError::new(line_no, "inconsistent indentation"));
            }
        }

        let had_content = lex_line(&raw_line[indent..], line_no, &mut tokens)?;
        if had_content {
            tokens.push(Token {
                tok: Tok::Newline,
                line: line_no,
            });
        }
    }

    let final_line = source.lines().count().max(1);
    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token {
            tok: Tok::Dedent,
            line: final_line,
        });
    }
    tokens.push(Token {
        tok: Tok::Eof,
        line: final_line,
    });
    Ok(tokens)
}

/// Tokenize one logical line (indentation already consumed). Returns false
/// if the line held only a comment.
fn lex_line(text: &str, line: usize, out: &mut Vec<Token>) -> Result<bool, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    let mut emitted = false;
    let mut push = |tok: Tok, out: &mut Vec<Token>| {
        out.push(Token { tok, line });
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => {
                i += 1;
            }
            '#' => break,
            '\'' | '"' => {
                let (value, next) = lex_string(&chars, i, line)?;
                push(Tok::Str(value), out);
                emitted = true;
                i = next;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i < chars.len() && chars[i] == '.' {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| ParseError::new(line, format!("bad float literal: {text}")))?;
                    push(Tok::Float(value), out);
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| ParseError::new(line, format!("bad int literal: {text}")))?;
                    push(Tok::Int(value), out);
                }
                emitted = true;
            }
            c if c.is_alphabetic() || c == '_' => {
                // f-prefixed string literal
                if c == 'f' && i + 1 < chars.len() && (chars[i + 1] == '\'' || chars[i + 1] == '"')
                {
                    let (value, next) = lex_string(&chars, i + 1, line)?;
                    push(Tok::FStr(value), out);
                    emitted = true;
                    i = next;
                    continue;
                }
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                push(Tok::Ident(ident), out);
                emitted = true;
            }
            _ => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let sym = match two.as_str() {
                    "==" => Some((Sym::Eq, 2)),
                    "!=" => Some((Sym::NotEq, 2)),
                    "<=" => Some((Sym::LtE, 2)),
                    ">=" => Some((Sym::GtE, 2)),
                    _ => None,
                };
                let (sym, width) = match sym {
                    Some(pair) => pair,
                    None => {
                        let s = match c {
                            '(' => Sym::LParen,
                            ')' => Sym::RParen,
                            '[' => Sym::LBracket,
                            ']' => Sym::RBracket,
                            '{' => Sym::LBrace,
                            '}' => Sym::RBrace,
                            ',' => Sym::Comma,
                            ':' => Sym::Colon,
                            '.' => Sym::Dot,
                            '=' => Sym::Assign,
                            '<' => Sym::Lt,
                            '>' => Sym::Gt,
                            '+' => Sym::Plus,
                            '-' => Sym::Minus,
                            '*' => Sym::Star,
                            '/' => Sym::Slash,
                            '%' => Sym::Percent,
                            other => {
                                return Err(ParseError::new(
                                    line,
                                    format!("unexpected character: {other:?}"),
                                ));
                            }
                        };
                        (s, 1)
                    }
                };
                push(Tok::Sym(sym), out);
                emitted = true;
                i += width;
            }
        }
    }
    Ok(emitted)
}

/// Lex a quoted string starting at the opening quote. Returns the unescaped
/// value and the index just past the closing quote.
fn lex_string(chars: &[char], start: usize, line: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((value, i + 1));
        }
        if c == '\\' {
            i += 1;
            let esc = chars
                .get(i)
                .ok_or_else(|| ParseError::new(line, "dangling escape in string literal"))?;
            value.push(match esc {
                'n' => '\n',
                't' => '\t',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                other => {
                    return Err(ParseError::new(
                        line,
                        format!("unknown escape: \\{other}"),
                    ));
                }
            });
            i += 1;
            continue;
        }
        value.push(c);
        i += 1;
    }
    Err(ParseError::new(line, "unterminated string literal"))
}

// ── Parser ─────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.parse_stmt()?);
    }
    Ok(Module { body })
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_ahead(&self, n: usize) -> &Tok {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn accept_sym(&mut self, sym: Sym) -> bool {
        if self.peek() == &Tok::Sym(sym) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: Sym, what: &str) -> Result<(), ParseError> {
        if self.accept_sym(sym) {
            Ok(())
        } else {
            Err(self.err(format!("expected {what}")))
        }
    }

    fn accept_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Tok::Ident(s) if s == word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_newline(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Tok::Newline => {
                self.advance();
                Ok(())
            }
            Tok::Eof => Ok(()),
            _ => Err(self.err("expected end of statement")),
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Ident(s) if !is_keyword(&s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.err(format!("expected {what}"))),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().clone() {
            Tok::Ident(word) => match word.as_str() {
                "def" => self.parse_def(),
                "if" => self.parse_if(),
                "for" => self.parse_for(),
                "while" => self.parse_while(),
                "return" => {
                    self.advance();
                    let value = if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect_newline()?;
                    Ok(Stmt::Return(value))
                }
                "break" => {
                    self.advance();
                    self.expect_newline()?;
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.advance();
                    self.expect_newline()?;
                    Ok(Stmt::Continue)
                }
                "pass" => {
                    self.advance();
                    self.expect_newline()?;
                    Ok(Stmt::Pass)
                }
                "import" => {
                    self.advance();
                    let mut path = self.expect_name("module name")?;
                    while self.accept_sym(Sym::Dot) {
                        let part = self.expect_name("module path segment")?;
                        path.push('.');
                        path.push_str(&part);
                    }
                    self.expect_newline()?;
                    Ok(Stmt::Import(path))
                }
                "global" => {
                    self.advance();
                    let mut names = vec![self.expect_name("name")?];
                    while self.accept_sym(Sym::Comma) {
                        names.push(self.expect_name("name")?);
                    }
                    self.expect_newline()?;
                    Ok(Stmt::Global(names))
                }
                _ => self.parse_simple_stmt(),
            },
            _ => self.parse_simple_stmt(),
        }
    }

    /// Assignment to a bare name, or an expression statement.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        if let Tok::Ident(name) = self.peek().clone() {
            if !is_keyword(&name) && self.peek_ahead(1) == &Tok::Sym(Sym::Assign) {
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                self.expect_newline()?;
                return Ok(Stmt::Assign {
                    target: name,
                    value,
                });
            }
        }
        let expr = self.parse_expr()?;
        self.expect_newline()?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_def(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // def
        let name = self.expect_name("function name")?;
        self.expect_sym(Sym::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if self.peek() != &Tok::Sym(Sym::RParen) {
            loop {
                params.push(self.expect_name("parameter name")?);
                if !self.accept_sym(Sym::Comma) {
                    break;
                }
            }
        }
        self.expect_sym(Sym::RParen, "')' after parameters")?;
        self.expect_sym(Sym::Colon, "':' after signature")?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDef(FunctionDef { name, params, body }))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // if
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.expect_sym(Sym::Colon, "':' after condition")?;
        branches.push((cond, self.parse_block()?));
        let mut orelse = Vec::new();
        loop {
            if self.accept_ident("elif") {
                let cond = self.parse_expr()?;
                self.expect_sym(Sym::Colon, "':' after condition")?;
                branches.push((cond, self.parse_block()?));
            } else if self.accept_ident("else") {
                self.expect_sym(Sym::Colon, "':' after else")?;
                orelse = self.parse_block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // for
        let target = self.expect_name("loop variable")?;
        if !self.accept_ident("in") {
            return Err(self.err("expected 'in'"));
        }
        let iter = self.parse_expr()?;
        self.expect_sym(Sym::Colon, "':' after iterable")?;
        let body = self.parse_block()?;
        Ok(Stmt::For { target, iter, body })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // while
        let cond = self.parse_expr()?;
        self.expect_sym(Sym::Colon, "':' after condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_newline()?;
        if !matches!(self.peek(), Tok::Indent) {
            return Err(self.err("expected an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        while !matches!(self.peek(), Tok::Dedent | Tok::Eof) {
            body.push(self.parse_stmt()?);
        }
        if matches!(self.peek(), Tok::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_and()?;
        let mut values = vec![first];
        while self.accept_ident("or") {
            values.push(self.parse_and()?);
        }
        if values.len() == 1 {
            Ok(values.pop().unwrap())
        } else {
            Ok(Expr::BoolOp {
                op: BoolOpKind::Or,
                values,
            })
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_not()?;
        let mut values = vec![first];
        while self.accept_ident("and") {
            values.push(self.parse_not()?);
        }
        if values.len() == 1 {
            Ok(values.pop().unwrap())
        } else {
            Ok(Expr::BoolOp {
                op: BoolOpKind::And,
                values,
            })
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.accept_ident("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Sym(Sym::Eq) => CmpOpKind::Eq,
                Tok::Sym(Sym::NotEq) => CmpOpKind::NotEq,
                Tok::Sym(Sym::Lt) => CmpOpKind::Lt,
                Tok::Sym(Sym::LtE) => CmpOpKind::LtE,
                Tok::Sym(Sym::Gt) => CmpOpKind::Gt,
                Tok::Sym(Sym::GtE) => CmpOpKind::GtE,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                rest,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Sym(Sym::Plus) => BinOpKind::Add,
                Tok::Sym(Sym::Minus) => BinOpKind::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Tok::Sym(Sym::Star) => BinOpKind::Mul,
                Tok::Sym(Sym::Slash) => BinOpKind::Div,
                Tok::Sym(Sym::Percent) => BinOpKind::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        if self.accept_sym(Sym::Minus) {
            let operand = self.parse_factor()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Neg,
                operand: Box::new(operand),
            });
        }
        if self.accept_sym(Sym::Plus) {
            return self.parse_factor();
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.accept_sym(Sym::LParen) {
                let mut args = Vec::new();
                if self.peek() != &Tok::Sym(Sym::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.accept_sym(Sym::Comma) {
                            break;
                        }
                    }
                }
                self.expect_sym(Sym::RParen, "')' after arguments")?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.accept_sym(Sym::Dot) {
                let attr = self.expect_name("attribute name")?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.accept_sym(Sym::LBracket) {
                let index = self.parse_expr()?;
                self.expect_sym(Sym::RBracket, "']' after index")?;
                expr = Expr::Index {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Tok::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            Tok::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::FStr(raw) => {
                let line = self.line();
                self.advance();
                Ok(Expr::FString(parse_fstring(&raw, line)?))
            }
            Tok::Ident(word) => match word.as_str() {
                "True" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "False" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "None" => {
                    self.advance();
                    Ok(Expr::None)
                }
                "lambda" => {
                    self.advance();
                    let mut params = Vec::new();
                    if self.peek() != &Tok::Sym(Sym::Colon) {
                        loop {
                            params.push(self.expect_name("parameter name")?);
                            if !self.accept_sym(Sym::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect_sym(Sym::Colon, "':' in lambda")?;
                    let body = self.parse_expr()?;
                    Ok(Expr::Lambda {
                        params,
                        body: Box::new(body),
                    })
                }
                w if is_keyword(w) => Err(self.err(format!("unexpected keyword: {w}"))),
                _ => {
                    self.advance();
                    Ok(Expr::Name(word))
                }
            },
            Tok::Sym(Sym::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_sym(Sym::RParen, "')'")?;
                Ok(expr)
            }
            Tok::Sym(Sym::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != &Tok::Sym(Sym::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.accept_sym(Sym::Comma) {
                            break;
                        }
                    }
                }
                self.expect_sym(Sym::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Tok::Sym(Sym::LBrace) => {
                self.advance();
                let mut pairs = Vec::new();
                if self.peek() != &Tok::Sym(Sym::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect_sym(Sym::Colon, "':' in dict literal")?;
                        let value = self.parse_expr()?;
                        pairs.push((key, value));
                        if !self.accept_sym(Sym::Comma) {
                            break;
                        }
                    }
                }
                self.expect_sym(Sym::RBrace, "'}'")?;
                Ok(Expr::Dict(pairs))
            }
            other => Err(self.err(format!("unexpected token: {other:?}"))),
        }
    }
}

/// Split f-string text into literal and `{expression}` parts. `{{` and `}}`
/// are literal braces; interpolations may not nest braces.
fn parse_fstring(raw: &str, line: usize) -> Result<Vec<FStringPart>, ParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '{' => {
                if !text.is_empty() {
                    parts.push(FStringPart::Text(std::mem::take(&mut text)));
                }
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '}' {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(ParseError::new(line, "unclosed '{' in f-string"));
                }
                let fragment: String = chars[start..end].iter().collect();
                if fragment.trim().is_empty() {
                    return Err(ParseError::new(line, "empty interpolation in f-string"));
                }
                parts.push(FStringPart::Expr(parse_expr_fragment(&fragment, line)?));
                i = end + 1;
            }
            '}' => {
                return Err(ParseError::new(line, "stray '}' in f-string"));
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    if !text.is_empty() {
        parts.push(FStringPart::Text(text));
    }
    Ok(parts)
}

/// Parse a single expression out of a bare fragment (used for f-string
/// interpolations).
fn parse_expr_fragment(fragment: &str, line: usize) -> Result<Expr, ParseError> {
    let mut tokens = Vec::new();
    lex_line(fragment, line, &mut tokens)?;
    tokens.push(Token {
        tok: Tok::Eof,
        line,
    });
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if !parser.at_eof() {
        return Err(ParseError::new(line, "trailing tokens in interpolation"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::NodeKind;

    #[test]
    fn parses_minimal_def() {
        let module = parse_module("def add(self, num1, num2):\n    return num1 + num2\n")
            .expect("parse");
        let defs = module.function_defs();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "add");
        assert_eq!(defs[0].params, vec!["self", "num1", "num2"]);
        assert!(crate::core::ast::contains_return(&defs[0].body));
    }

    #[test]
    fn parses_nested_blocks() {
        let src = "def keep(self, xs):\n    kept = []\n    for x in xs:\n        if x > 0:\n            kept = kept + [x]\n    return kept\n";
        let module = parse_module(src).expect("parse");
        let mut kinds = Vec::new();
        module.walk_kinds(&mut |k| kinds.push(k));
        assert!(kinds.contains(&NodeKind::For));
        assert!(kinds.contains(&NodeKind::If));
        assert!(kinds.contains(&NodeKind::ListLit));
    }

    #[test]
    fn parses_elif_else_chain() {
        let src = "def cmp(self, a, b):\n    if a == b:\n        return \"equal\"\n    elif a > b:\n        return \"a > b\"\n    else:\n        return \"a < b\"\n";
        let module = parse_module(src).expect("parse");
        match &module.function_defs()[0].body[0] {
            Stmt::If { branches, orelse } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(orelse.len(), 1);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn parses_fstring_interpolation() {
        let module =
            parse_module("def greet(self, name):\n    return f'Hello, {name}!'\n").expect("parse");
        let mut kinds = Vec::new();
        module.walk_kinds(&mut |k| kinds.push(k));
        assert!(kinds.contains(&NodeKind::FString));
        assert!(kinds.contains(&NodeKind::Name));
    }

    #[test]
    fn reports_bad_indentation() {
        let err = parse_module("def f(self):\n    x = 1\n  y = 2\n").unwrap_err();
        assert!(err.message.contains("indentation"));
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = parse_module("def f(self):\n    return 'oops\n").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn collects_import_roots_and_callees() {
        let src = "import collections.abc\ndef f(self, xs):\n    while True:\n        eval('xs')\n        break\n    return sorted(xs)\n";
        let module = parse_module(src).expect("parse");
        assert_eq!(module.import_roots(), vec!["collections"]);
        let callees = module.bare_callees();
        assert!(callees.contains(&"eval".to_string()));
        assert!(callees.contains(&"sorted".to_string()));
    }
}
