use std::sync::Arc;

use crate::syntax::span::{Span, Spanned};

/// A parsed kernel: an arrow function or a `function` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct FnDecl {
    pub name: Option<Spanned<String>>,
    pub params: Vec<Param>,
    pub body: Spanned<Block>,
    pub span: Span,
}

/// A function parameter with an optional `: annotation`.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Spanned<String>,
    pub annotation: Option<Spanned<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

/// The variable(s) bound by a `for ... of` loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ForBinding {
    Name(Spanned<String>),
    /// `for (let [i, j] of ndrange(n, m))`
    Destructure(Vec<Spanned<String>>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let {
        kind: DeclKind,
        name: Spanned<String>,
        init: Option<Spanned<Expr>>,
    },
    Function(Arc<FnDecl>),
    If {
        cond: Spanned<Expr>,
        then_branch: Box<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },
    For {
        binding: ForBinding,
        iter: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },
    While {
        cond: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Spanned<Expr>>),
    Block(Block),
    Assign {
        op: AssignOp,
        place: Spanned<Expr>,
        value: Spanned<Expr>,
    },
    Expr(Spanned<Expr>),
    Empty,
}

impl Stmt {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Let { .. } => "variable declaration",
            Stmt::Function(_) => "function declaration",
            Stmt::If { .. } => "if statement",
            Stmt::For { .. } => "for statement",
            Stmt::While { .. } => "while statement",
            Stmt::Break => "break statement",
            Stmt::Continue => "continue statement",
            Stmt::Return(_) => "return statement",
            Stmt::Block(_) => "block",
            Stmt::Assign { .. } => "assignment",
            Stmt::Expr(_) => "expression statement",
            Stmt::Empty => "empty statement",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    BitAnd,
    BitOr,
    BitXor,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::BitAnd => Some(BinOp::BitAnd),
            AssignOp::BitOr => Some(BinOp::BitOr),
            AssignOp::BitXor => Some(BinOp::BitXor),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Bool(bool),
    Var(String),
    This,
    /// `[a, b, c]`: a vector, or a matrix when the elements are arrays.
    Array(Vec<Spanned<Expr>>),
    /// `{ a: 1, b: v }`
    Object(Vec<(Spanned<String>, Spanned<Expr>)>),
    Member {
        base: Box<Spanned<Expr>>,
        name: Spanned<String>,
    },
    /// `a[i]` or `a[i, j]`
    Index {
        base: Box<Spanned<Expr>>,
        indices: Vec<Spanned<Expr>>,
    },
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },
    Unary {
        op: UnOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Conditional {
        cond: Box<Spanned<Expr>>,
        then_expr: Box<Spanned<Expr>>,
        else_expr: Box<Spanned<Expr>>,
    },
    Arrow(Arc<FnDecl>),
}

impl Expr {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Int(_) | Expr::Float(_) => "number literal",
            Expr::Bool(_) => "boolean literal",
            Expr::Var(_) => "identifier",
            Expr::This => "this",
            Expr::Array(_) => "array literal",
            Expr::Object(_) => "object literal",
            Expr::Member { .. } => "member access",
            Expr::Index { .. } => "index expression",
            Expr::Call { .. } => "call expression",
            Expr::Unary { .. } => "unary expression",
            Expr::Binary { .. } => "binary expression",
            Expr::Conditional { .. } => "conditional expression",
            Expr::Arrow(_) => "arrow function",
        }
    }

    /// Dotted path of a `a.b.c` chain rooted at an identifier.
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Var(name) => Some(name.clone()),
            Expr::This => Some("this".to_string()),
            Expr::Member { base, name } => {
                let mut path = base.node.dotted_path()?;
                path.push('.');
                path.push_str(&name.node);
                Some(path)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    /// Integer division rounding toward negative infinity.
    FloorDiv,
    MatMul,
}

impl BinOp {
    /// Returns (left binding power, right binding power).
    /// Higher binding power = higher precedence.
    pub fn binding_power(self) -> (u8, u8) {
        match self {
            BinOp::LogicalOr => (2, 3),
            BinOp::LogicalAnd => (4, 5),
            BinOp::BitOr => (6, 7),
            BinOp::BitXor => (8, 9),
            BinOp::BitAnd => (10, 11),
            BinOp::Eq | BinOp::Ne => (12, 13),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (14, 15),
            BinOp::Shl | BinOp::Shr => (16, 17),
            BinOp::Add | BinOp::Sub => (18, 19),
            BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::FloorDiv | BinOp::MatMul => (20, 21),
            // right-associative
            BinOp::Pow => (23, 22),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::LogicalAnd | BinOp::LogicalOr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::LogicalOr => "||",
            BinOp::LogicalAnd => "&&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::FloorDiv => "//",
            BinOp::MatMul => "@",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
}
