use std::sync::Arc;

use crate::syntax::ast::*;
use crate::syntax::lexeme::Lexeme;
use crate::syntax::span::Spanned;

use super::Parser;

impl Parser {
    pub(super) fn parse_block(&mut self) -> Spanned<Block> {
        let start = self.current_span();
        if !self.enter_nesting() {
            while !self.at(&Lexeme::Eof) {
                self.advance();
            }
            return Spanned::new(Block { stmts: Vec::new() }, start);
        }
        self.expect(&Lexeme::LBrace);
        let mut stmts = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            let before = self.pos;
            let stmt = self.parse_stmt();
            if !matches!(stmt.node, Stmt::Empty) {
                stmts.push(stmt);
            }
            if self.pos == before {
                // no progress: skip the offending token
                self.advance();
            }
        }
        self.expect(&Lexeme::RBrace);
        self.exit_nesting();
        Spanned::new(Block { stmts }, start.merge(self.prev_span()))
    }

    pub(super) fn parse_stmt(&mut self) -> Spanned<Stmt> {
        let start = self.current_span();
        let stmt = match self.peek() {
            Lexeme::LBrace => Stmt::Block(self.parse_block().node),
            Lexeme::Let | Lexeme::Const | Lexeme::Var => self.parse_let(),
            Lexeme::Function => Stmt::Function(Arc::new(self.parse_function_decl())),
            Lexeme::If => self.parse_if(),
            Lexeme::For => self.parse_for(),
            Lexeme::While => self.parse_while(),
            Lexeme::Break => {
                self.advance();
                Stmt::Break
            }
            Lexeme::Continue => {
                self.advance();
                Stmt::Continue
            }
            Lexeme::Return => {
                self.advance();
                if self.at(&Lexeme::Semicolon)
                    || self.at(&Lexeme::RBrace)
                    || self.at(&Lexeme::Eof)
                {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.parse_expr()))
                }
            }
            Lexeme::Semicolon => Stmt::Empty,
            _ => self.parse_expr_or_assign(),
        };
        self.eat(&Lexeme::Semicolon);
        Spanned::new(stmt, start.merge(self.prev_span()))
    }

    fn parse_let(&mut self) -> Stmt {
        let kind = match self.peek() {
            Lexeme::Const => DeclKind::Const,
            Lexeme::Var => DeclKind::Var,
            _ => DeclKind::Let,
        };
        self.advance();
        let name = self.expect_ident();
        let init = if self.eat(&Lexeme::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        if self.at(&Lexeme::Comma) {
            self.error_with_help(
                "multiple declarators in one statement are not supported",
                "declare each variable with its own `let`",
            );
        }
        Stmt::Let { kind, name, init }
    }

    fn parse_if(&mut self) -> Stmt {
        self.expect(&Lexeme::If);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        let then_branch = Box::new(self.parse_nested_stmt());
        let else_branch = if self.eat(&Lexeme::Else) {
            Some(Box::new(self.parse_nested_stmt()))
        } else {
            None
        };
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        }
    }

    fn parse_for(&mut self) -> Stmt {
        self.expect(&Lexeme::For);
        self.expect(&Lexeme::LParen);
        if matches!(self.peek(), Lexeme::Let | Lexeme::Const | Lexeme::Var) {
            self.advance();
        }
        let binding = if self.eat(&Lexeme::LBracket) {
            let mut names = Vec::new();
            while !self.at(&Lexeme::RBracket) && !self.at(&Lexeme::Eof) {
                names.push(self.expect_ident());
                if !self.eat(&Lexeme::Comma) {
                    break;
                }
            }
            self.expect(&Lexeme::RBracket);
            ForBinding::Destructure(names)
        } else {
            ForBinding::Name(self.expect_ident())
        };
        if !self.at(&Lexeme::Of) {
            self.error_with_help(
                &format!(
                    "expected 'of' in for loop, found {}",
                    self.peek().description()
                ),
                "loops are written `for (let i of range(n))` or `for (let I of ndrange(n, m))`",
            );
            // resynchronise at the closing parenthesis
            while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
                self.advance();
            }
        } else {
            self.advance();
        }
        let iter = self.parse_expr();
        self.expect(&Lexeme::RParen);
        let body = Box::new(self.parse_nested_stmt());
        Stmt::For {
            binding,
            iter,
            body,
        }
    }

    fn parse_while(&mut self) -> Stmt {
        self.expect(&Lexeme::While);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        let body = Box::new(self.parse_nested_stmt());
        Stmt::While { cond, body }
    }

    fn parse_nested_stmt(&mut self) -> Spanned<Stmt> {
        if !self.enter_nesting() {
            let span = self.current_span();
            while !self.at(&Lexeme::Eof) {
                self.advance();
            }
            return Spanned::new(Stmt::Empty, span);
        }
        let stmt = self.parse_stmt();
        self.exit_nesting();
        stmt
    }

    fn parse_expr_or_assign(&mut self) -> Stmt {
        let place = self.parse_expr();
        let op = match self.peek() {
            Lexeme::Eq => AssignOp::Assign,
            Lexeme::PlusEq => AssignOp::Add,
            Lexeme::MinusEq => AssignOp::Sub,
            Lexeme::StarEq => AssignOp::Mul,
            Lexeme::SlashEq => AssignOp::Div,
            Lexeme::AmpEq => AssignOp::BitAnd,
            Lexeme::PipeEq => AssignOp::BitOr,
            Lexeme::CaretEq => AssignOp::BitXor,
            _ => return Stmt::Expr(place),
        };
        self.advance();
        let value = self.parse_expr();
        if self.peek().is_assign() {
            self.error_with_help(
                "chained assignment is not supported",
                "split it into separate assignments",
            );
        }
        Stmt::Assign { op, place, value }
    }
}
