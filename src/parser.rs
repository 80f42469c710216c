use std::mem;

use thiserror::Error;

use crate::ast::{BlockStatement, Expr, InfixOp, PrefixOp, Program, Stmt};
use crate::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

// Lowest binds loosest, And tightest. `In` never appears in operator
// position (the `for` form consumes it), but it keeps its slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
    #[allow(dead_code)]
    In,
    Dot,
    And,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Slash | TokenKind::Asterisk => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        TokenKind::Dot => Precedence::Dot,
        TokenKind::And => Precedence::And,
        _ => Precedence::Lowest,
    }
}

/// Pratt parser over the lexer's token stream. Errors accumulate and parsing
/// continues best-effort; a non-empty error list fails the parse.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    peek: Token,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Self {
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            cur,
            peek,
            errors: Vec::new(),
        }
    }

    pub fn parse_program(mut self) -> Result<Program, Vec<ParseError>> {
        let mut statements = Vec::new();

        while !self.cur_is(&TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.next_token();
        }

        if self.errors.is_empty() {
            Ok(Program::new(statements))
        } else {
            Err(self.errors)
        }
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.cur.kind {
            TokenKind::Var => self.parse_var_statement(),
            TokenKind::Extends => self.parse_extends_statement(),
            TokenKind::Section => self.parse_section_statement(),
            TokenKind::Define => self.parse_define_statement(),
            TokenKind::Include => self.parse_include_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_var_statement(&mut self) -> Option<Stmt> {
        let token = self.cur.clone();

        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();

        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }

        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(&TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Stmt::Var { token, name, value })
    }

    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(&TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Stmt::Expr(expr))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(&TokenKind::Semicolon) && precedence < precedence_of(&self.peek.kind) {
            if !has_infix(&self.peek.kind) {
                return Some(left);
            }
            self.next_token();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        let token = self.cur.clone();
        match token.kind {
            TokenKind::Ident => Some(Expr::Ident {
                name: token.literal.clone(),
                token,
            }),
            TokenKind::Int => self.parse_integer_literal(),
            TokenKind::Str { closed } => Some(Expr::Str {
                value: unquote(&token.literal, closed),
                token,
                closed,
            }),
            TokenKind::Html => Some(Expr::Html {
                value: token.literal.clone(),
                token,
            }),
            // A bare end-of-code marker renders as nothing.
            TokenKind::Eoc => Some(Expr::Str {
                value: String::new(),
                token,
                closed: true,
            }),
            TokenKind::True => Some(Expr::Bool { token, value: true }),
            TokenKind::False => Some(Expr::Bool {
                token,
                value: false,
            }),
            TokenKind::Bang => self.parse_prefix_expression(PrefixOp::Bang),
            TokenKind::Minus => self.parse_prefix_expression(PrefixOp::Minus),
            TokenKind::LParen => self.parse_grouped_expression(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_map_literal(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::For => self.parse_for_expression(),
            _ => {
                self.errors.push(ParseError::new(
                    format!("unexpected token {}", token.kind),
                    &token,
                ));
                None
            }
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        match self.cur.kind {
            TokenKind::LParen => self.parse_call_expression(left),
            TokenKind::LBracket => self.parse_index_expression(left),
            TokenKind::Dot => self.parse_dot_expression(left),
            TokenKind::And => self.parse_and_expression(left),
            _ => self.parse_infix_expression(left),
        }
    }

    fn parse_integer_literal(&mut self) -> Option<Expr> {
        let token = self.cur.clone();
        match token.literal.parse::<i64>() {
            Ok(value) => Some(Expr::Int { token, value }),
            Err(_) => {
                self.errors.push(ParseError::new(
                    format!("could not parse \"{}\" as integer", token.literal),
                    &token,
                ));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self, operator: PrefixOp) -> Option<Expr> {
        let token = self.cur.clone();
        self.next_token();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expr::Prefix {
            token,
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur.clone();
        let operator = match token.kind {
            TokenKind::Plus => InfixOp::Plus,
            TokenKind::Minus => InfixOp::Minus,
            TokenKind::Asterisk => InfixOp::Asterisk,
            TokenKind::Slash => InfixOp::Slash,
            TokenKind::Lt => InfixOp::Lt,
            TokenKind::Gt => InfixOp::Gt,
            TokenKind::Eq => InfixOp::Eq,
            TokenKind::NotEq => InfixOp::NotEq,
            _ => {
                self.errors.push(ParseError::new(
                    format!("unexpected token {} in operator position", token.kind),
                    &token,
                ));
                return None;
            }
        };

        let precedence = precedence_of(&token.kind);
        self.next_token();
        let right = self.parse_expression(precedence)?;

        Some(Expr::Infix {
            token,
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    // Legacy shape: the right-hand side of `and` is parsed at the lowest
    // precedence, so `a and b and c` groups to the right.
    fn parse_and_expression(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur.clone();
        self.next_token();
        let right = self.parse_expression(Precedence::Lowest)?;

        Some(Expr::Infix {
            token,
            left: Box::new(left),
            operator: InfixOp::And,
            right: Box::new(right),
        })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.next_token();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        Some(expr)
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let token = self.cur.clone();
        let elements = self.parse_expression_list(TokenKind::RBracket)?;
        Some(Expr::Array { token, elements })
    }

    fn parse_map_literal(&mut self) -> Option<Expr> {
        let token = self.cur.clone();
        let mut pairs = Vec::new();

        while !self.peek_is(&TokenKind::RBrace) {
            self.next_token();
            let key = self.parse_expression(Precedence::Lowest)?;

            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }

            self.next_token();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.peek_is(&TokenKind::RBrace) && !self.expect_peek(TokenKind::Comma) {
                return None;
            }
        }

        if !self.expect_peek(TokenKind::RBrace) {
            return None;
        }

        Some(Expr::Map { token, pairs })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expr>> {
        let mut list = Vec::new();

        if self.peek_is(&end) {
            self.next_token();
            return Some(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(&TokenKind::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }

        Some(list)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let token = self.cur.clone();
        let arguments = self.parse_expression_list(TokenKind::RParen)?;
        Some(Expr::Call {
            token,
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur.clone();
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::RBracket) {
            return None;
        }

        Some(Expr::Index {
            token,
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    // Only a plain identifier may appear on either side of `.`, so dot
    // chains do not nest.
    fn parse_dot_expression(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur.clone();

        if !matches!(left, Expr::Ident { .. }) {
            self.errors.push(ParseError::new(
                format!("expected identifier on left side of '.', got {left}"),
                &token,
            ));
            return None;
        }

        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }

        Some(Expr::Dot {
            token,
            object: Box::new(left),
            field: self.cur.literal.clone(),
        })
    }

    // `if cond ?} body {? else ?} body {? endif`. There is no `else if`;
    // chained conditionals nest.
    fn parse_if_expression(&mut self) -> Option<Expr> {
        let token = self.cur.clone();

        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::Eoc) {
            return None;
        }

        let consequence = self.parse_block_statement(&[TokenKind::Endif, TokenKind::Else]);

        let alternative = if self.cur_is(&TokenKind::Else) {
            if !self.expect_peek(TokenKind::Eoc) {
                return None;
            }
            Some(self.parse_block_statement(&[TokenKind::Endif]))
        } else {
            None
        };

        Some(Expr::If {
            token,
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    // `for v in expr ?} body {? endfor` or `for k, v in expr ?} … endfor`.
    fn parse_for_expression(&mut self) -> Option<Expr> {
        let token = self.cur.clone();

        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let first = self.cur.literal.clone();

        let (key, value) = if self.peek_is(&TokenKind::Comma) {
            self.next_token();
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            (Some(first), self.cur.literal.clone())
        } else {
            (None, first)
        };

        if !self.expect_peek(TokenKind::In) {
            return None;
        }

        self.next_token();
        let iterable = self.parse_expression(Precedence::Lowest)?;

        let block = self.parse_block_statement(&[TokenKind::Endfor]);

        Some(Expr::For {
            token,
            key,
            value,
            iterable: Box::new(iterable),
            block,
        })
    }

    fn parse_extends_statement(&mut self) -> Option<Stmt> {
        let token = self.cur.clone();

        let from = self.parse_string_argument()?;

        if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::Eoc) {
            return None;
        }

        Some(Stmt::Extends { token, from })
    }

    fn parse_section_statement(&mut self) -> Option<Stmt> {
        let token = self.cur.clone();

        let name = self.parse_string_argument()?;

        if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::Eoc) {
            return None;
        }

        let block = self.parse_block_statement(&[TokenKind::Endsection]);

        Some(Stmt::Section { token, name, block })
    }

    fn parse_define_statement(&mut self) -> Option<Stmt> {
        let token = self.cur.clone();

        let name = self.parse_string_argument()?;

        if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::Eoc) {
            return None;
        }

        let body = self.parse_block_statement(&[TokenKind::End]);

        Some(Stmt::Define { token, name, body })
    }

    fn parse_include_statement(&mut self) -> Option<Stmt> {
        let token = self.cur.clone();

        let file = self.parse_string_argument()?;

        let vars = if self.peek_is(&TokenKind::Comma) {
            self.next_token();
            self.next_token();
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            None
        };

        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }

        Some(Stmt::Include { token, file, vars })
    }

    // The composition keywords all take `("name"` immediately after the
    // keyword; the target must be a string literal.
    fn parse_string_argument(&mut self) -> Option<String> {
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        if !self.expect_peek(TokenKind::Str { closed: true }) {
            return None;
        }

        let closed = matches!(self.cur.kind, TokenKind::Str { closed: true });
        Some(unquote(&self.cur.literal, closed))
    }

    // Consumes statements until one of `terminators` is the current token.
    // The terminator itself is left for the caller.
    fn parse_block_statement(&mut self, terminators: &[TokenKind]) -> BlockStatement {
        let token = self.cur.clone();
        let mut statements = Vec::new();

        self.next_token();

        while !self.cur_is(&TokenKind::Eof) && !terminators.iter().any(|t| self.cur_is(t)) {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.next_token();
        }

        if !terminators.iter().any(|t| self.cur_is(t)) {
            self.errors.push(ParseError::new(
                format!(
                    "expected next token to be {}, got {} instead",
                    terminators[0], self.cur.kind
                ),
                &self.cur,
            ));
        }

        BlockStatement { token, statements }
    }

    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(&kind) {
            self.next_token();
            true
        } else {
            self.errors.push(ParseError::new(
                format!(
                    "expected next token to be {}, got {} instead",
                    kind, self.peek.kind
                ),
                &self.peek,
            ));
            false
        }
    }

    fn cur_is(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.cur.kind) == mem::discriminant(kind)
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.peek.kind) == mem::discriminant(kind)
    }

    fn next_token(&mut self) {
        self.cur = mem::replace(&mut self.peek, self.lexer.next_token());
    }
}

fn has_infix(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Slash
            | TokenKind::Asterisk
            | TokenKind::Eq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::Dot
            | TokenKind::And
    )
}

fn unquote(literal: &str, closed: bool) -> String {
    let mut chars = literal.chars();
    chars.next();
    let inner = chars.as_str();
    if closed {
        let mut chars = inner.chars();
        chars.next_back();
        chars.as_str().to_string()
    } else {
        inner.to_string()
    }
}
