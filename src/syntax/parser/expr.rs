use std::sync::Arc;

use crate::syntax::ast::*;
use crate::syntax::lexeme::Lexeme;
use crate::syntax::span::Spanned;

use super::Parser;

/// Binding power of prefix operators; binds looser than `**` so `-x ** 2` is `-(x ** 2)`.
const PREFIX_BP: u8 = 22;

impl Parser {
    pub(super) fn parse_expr(&mut self) -> Spanned<Expr> {
        let cond = self.parse_expr_bp(0);
        if !self.eat(&Lexeme::Question) {
            return cond;
        }
        let then_expr = self.parse_expr();
        self.expect(&Lexeme::Colon);
        let else_expr = self.parse_expr();
        let span = cond.span.merge(else_expr.span);
        Spanned::new(
            Expr::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        )
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Spanned<Expr> {
        let mut lhs = self.parse_unary();

        loop {
            let op = match self.peek() {
                Lexeme::PipePipe => BinOp::LogicalOr,
                Lexeme::AmpAmp => BinOp::LogicalAnd,
                Lexeme::Pipe => BinOp::BitOr,
                Lexeme::Caret => BinOp::BitXor,
                Lexeme::Amp => BinOp::BitAnd,
                Lexeme::EqEq => BinOp::Eq,
                Lexeme::NotEq => BinOp::Ne,
                Lexeme::Lt => BinOp::Lt,
                Lexeme::Le => BinOp::Le,
                Lexeme::Gt => BinOp::Gt,
                Lexeme::Ge => BinOp::Ge,
                Lexeme::Shl => BinOp::Shl,
                Lexeme::Shr => BinOp::Shr,
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Div,
                Lexeme::Percent => BinOp::Mod,
                Lexeme::StarStar => BinOp::Pow,
                _ => break,
            };

            let (l_bp, r_bp) = op.binding_power();
            if l_bp < min_bp {
                break;
            }

            self.advance(); // consume operator
            let rhs = self.parse_expr_bp(r_bp);
            let span = lhs.span.merge(rhs.span);
            lhs = Spanned::new(
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }

        lhs
    }

    fn parse_unary(&mut self) -> Spanned<Expr> {
        let start = self.current_span();
        let op = match self.peek() {
            Lexeme::Minus => UnOp::Neg,
            Lexeme::Plus => UnOp::Plus,
            Lexeme::Bang => UnOp::Not,
            Lexeme::Tilde => UnOp::BitNot,
            _ => {
                let primary = self.parse_primary();
                return self.parse_postfix(primary);
            }
        };
        self.advance();
        let operand = self.parse_expr_bp(PREFIX_BP);
        let span = start.merge(operand.span);
        Spanned::new(
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        )
    }

    /// Postfix chains: `.member`, `[i, j]`, `(args)`.
    fn parse_postfix(&mut self, mut expr: Spanned<Expr>) -> Spanned<Expr> {
        loop {
            if self.eat(&Lexeme::Dot) {
                let name = self.expect_member_name();
                let span = expr.span.merge(name.span);
                expr = Spanned::new(
                    Expr::Member {
                        base: Box::new(expr),
                        name,
                    },
                    span,
                );
            } else if self.eat(&Lexeme::LBracket) {
                let indices = self.parse_list(&Lexeme::RBracket);
                self.expect(&Lexeme::RBracket);
                let span = expr.span.merge(self.prev_span());
                expr = Spanned::new(
                    Expr::Index {
                        base: Box::new(expr),
                        indices,
                    },
                    span,
                );
            } else if self.eat(&Lexeme::LParen) {
                let args = self.parse_list(&Lexeme::RParen);
                self.expect(&Lexeme::RParen);
                let span = expr.span.merge(self.prev_span());
                expr = Spanned::new(
                    Expr::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else {
                break;
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Spanned<Expr> {
        let start = self.current_span();

        match self.peek().clone() {
            Lexeme::Integer(n) => {
                self.advance();
                Spanned::new(Expr::Int(n), start)
            }
            Lexeme::Float(v) => {
                self.advance();
                Spanned::new(Expr::Float(v), start)
            }
            Lexeme::True => {
                self.advance();
                Spanned::new(Expr::Bool(true), start)
            }
            Lexeme::False => {
                self.advance();
                Spanned::new(Expr::Bool(false), start)
            }
            Lexeme::This => {
                self.advance();
                Spanned::new(Expr::This, start)
            }
            Lexeme::Ident(name) => {
                if self.is_arrow_ahead() {
                    let decl = self.parse_arrow();
                    let span = decl.span;
                    return Spanned::new(Expr::Arrow(Arc::new(decl)), span);
                }
                self.advance();
                Spanned::new(Expr::Var(name), start)
            }
            Lexeme::Function => {
                let decl = self.parse_function_decl();
                let span = decl.span;
                Spanned::new(Expr::Arrow(Arc::new(decl)), span)
            }
            Lexeme::LParen => {
                if self.is_arrow_ahead() {
                    let decl = self.parse_arrow();
                    let span = decl.span;
                    return Spanned::new(Expr::Arrow(Arc::new(decl)), span);
                }
                self.advance();
                let inner = self.parse_expr();
                if self.at(&Lexeme::Comma) {
                    self.error_with_help(
                        "comma expressions are not supported",
                        "build vectors with array literals: `[a, b]`",
                    );
                }
                self.expect(&Lexeme::RParen);
                Spanned::new(inner.node, start.merge(self.prev_span()))
            }
            Lexeme::LBracket => {
                self.advance();
                let elements = self.parse_list(&Lexeme::RBracket);
                self.expect(&Lexeme::RBracket);
                Spanned::new(Expr::Array(elements), start.merge(self.prev_span()))
            }
            Lexeme::LBrace => {
                self.advance();
                let fields = self.parse_object_fields();
                self.expect(&Lexeme::RBrace);
                Spanned::new(Expr::Object(fields), start.merge(self.prev_span()))
            }
            _ => {
                self.error_with_help(
                    &format!("expected expression, found {}", self.peek().description()),
                    "expressions include numbers, names, calls, arrays and operators",
                );
                self.advance();
                Spanned::new(Expr::Int(0), start)
            }
        }
    }

    /// Comma-separated expressions up to (not including) `close`; trailing comma allowed.
    fn parse_list(&mut self, close: &Lexeme) -> Vec<Spanned<Expr>> {
        let mut items = Vec::new();
        while !self.at(close) && !self.at(&Lexeme::Eof) {
            items.push(self.parse_expr());
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        items
    }

    fn parse_object_fields(&mut self) -> Vec<(Spanned<String>, Spanned<Expr>)> {
        let mut fields = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            let name = self.expect_ident();
            if self.eat(&Lexeme::Colon) {
                let value = self.parse_expr();
                fields.push((name, value));
            } else {
                // Shorthand: `{ name }` means `{ name: name }`
                let value = Spanned::new(Expr::Var(name.node.clone()), name.span);
                fields.push((name, value));
            }
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        fields
    }

    /// Member names may collide with keywords (`x.of`, `limits.const`).
    fn expect_member_name(&mut self) -> Spanned<String> {
        let span = self.current_span();
        let name = match self.peek() {
            Lexeme::Ident(name) => name.clone(),
            Lexeme::Const => "const".to_string(),
            Lexeme::Of => "of".to_string(),
            _ => return self.expect_ident(),
        };
        self.advance();
        Spanned::new(name, span)
    }
}
