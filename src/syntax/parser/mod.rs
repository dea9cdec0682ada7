use std::sync::Arc;

use crate::diagnostic::Diagnostic;
use crate::syntax::ast::*;
use crate::syntax::lexeme::Lexeme;
use crate::syntax::span::{Span, Spanned};

mod expr;
mod stmt;

const MAX_NESTING_DEPTH: u32 = 256;

pub(crate) struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    depth: u32,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            depth: 0,
        }
    }

    fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.error_with_help(
                "nesting depth exceeded (maximum 256 levels)",
                "extract deeply nested code into helper functions",
            );
            return false;
        }
        true
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }

    /// Parse a whole kernel source: `(params) => body` or `function name(params) { ... }`.
    pub(crate) fn parse_function_source(mut self) -> Result<Arc<FnDecl>, Vec<Diagnostic>> {
        let decl = if self.at(&Lexeme::Function) {
            Some(self.parse_function_decl())
        } else if self.is_arrow_ahead() {
            Some(self.parse_arrow())
        } else {
            self.error_with_help(
                &format!(
                    "expected a kernel function, found {}",
                    self.peek().description()
                ),
                "a kernel is written as `(args) => { ... }` or `function name(args) { ... }`",
            );
            None
        };
        self.eat(&Lexeme::Semicolon);
        if !self.at(&Lexeme::Eof) {
            self.error_at_current(&format!(
                "unexpected {} after the kernel function",
                self.peek().description()
            ));
        }

        match decl {
            Some(decl) if self.diagnostics.is_empty() => Ok(Arc::new(decl)),
            _ => Err(self.diagnostics),
        }
    }

    /// `function name(params) { body }`; the name is optional in expression position.
    fn parse_function_decl(&mut self) -> FnDecl {
        let start = self.current_span();
        self.expect(&Lexeme::Function);
        let name = if matches!(self.peek(), Lexeme::Ident(_)) {
            Some(self.expect_ident())
        } else {
            None
        };
        let params = self.parse_params();
        let body = self.parse_block();
        FnDecl {
            name,
            params,
            span: start.merge(self.prev_span()),
            body,
        }
    }

    /// `(a, b: i32) => ...` or `x => ...`; expression bodies become `{ return expr }`.
    fn parse_arrow(&mut self) -> FnDecl {
        let start = self.current_span();
        let params = if matches!(self.peek(), Lexeme::Ident(_)) {
            vec![Param {
                name: self.expect_ident(),
                annotation: None,
            }]
        } else {
            self.parse_params()
        };
        self.expect(&Lexeme::FatArrow);
        let body = if self.at(&Lexeme::LBrace) {
            self.parse_block()
        } else {
            let value = self.parse_expr();
            let span = value.span;
            Spanned::new(
                Block {
                    stmts: vec![Spanned::new(Stmt::Return(Some(value)), span)],
                },
                span,
            )
        };
        FnDecl {
            name: None,
            params,
            span: start.merge(self.prev_span()),
            body,
        }
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        self.expect(&Lexeme::LParen);
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
            let name = self.expect_ident();
            let annotation = if self.eat(&Lexeme::Colon) {
                Some(self.parse_annotation())
            } else {
                None
            };
            params.push(Param { name, annotation });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::RParen);
        params
    }

    /// A type annotation: `i32`, `template`, or a dotted name such as `ti.template()`.
    fn parse_annotation(&mut self) -> Spanned<String> {
        let first = self.expect_ident();
        let mut text = first.node;
        let mut span = first.span;
        while self.eat(&Lexeme::Dot) {
            let part = self.expect_ident();
            text.push('.');
            text.push_str(&part.node);
            span = span.merge(part.span);
        }
        if self.at(&Lexeme::LParen) {
            self.advance();
            self.expect(&Lexeme::RParen);
            span = span.merge(self.prev_span());
        }
        Spanned::new(text, span)
    }

    /// True when the tokens at the cursor start an arrow function.
    fn is_arrow_ahead(&self) -> bool {
        match self.peek() {
            Lexeme::Ident(_) => matches!(self.peek_nth(1), Lexeme::FatArrow),
            Lexeme::LParen => {
                let mut depth = 0usize;
                let mut i = self.pos;
                while i < self.tokens.len() {
                    match self.tokens[i].node {
                        Lexeme::LParen => depth += 1,
                        Lexeme::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(
                                    self.tokens.get(i + 1).map(|t| &t.node),
                                    Some(Lexeme::FatArrow)
                                );
                            }
                        }
                        Lexeme::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
                false
            }
            _ => false,
        }
    }

    // ─── token helpers ───────────────────────────────────────────────

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos].node
    }

    fn peek_nth(&self, n: usize) -> &Lexeme {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn advance(&mut self) -> &Spanned<Lexeme> {
        let tok = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, token: &Lexeme) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Lexeme) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Lexeme) -> Span {
        if self.at(token) {
            let span = self.current_span();
            self.advance();
            span
        } else {
            self.error_at_current(&format!(
                "expected {}, found {}",
                token.description(),
                self.peek().description()
            ));
            self.current_span()
        }
    }

    fn expect_ident(&mut self) -> Spanned<String> {
        if let Lexeme::Ident(name) = self.peek().clone() {
            let span = self.current_span();
            self.advance();
            Spanned::new(name, span)
        } else {
            self.error_at_current(&format!(
                "expected identifier, found {}",
                self.peek().description()
            ));
            Spanned::new("_error_".to_string(), self.current_span())
        }
    }

    fn error_at_current(&mut self, msg: &str) {
        self.diagnostics
            .push(Diagnostic::error(msg.to_string(), self.current_span()));
    }

    fn error_with_help(&mut self, msg: &str, help: &str) {
        self.diagnostics.push(
            Diagnostic::error(msg.to_string(), self.current_span()).with_help(help.to_string()),
        );
    }
}

#[cfg(test)]
mod tests;
