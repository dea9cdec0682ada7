//! Operand rendering, word access and operator expressions.

use crate::ir::{Literal, Operand, UnaryOp};
use crate::syntax::ast::BinOp;
use crate::types::{Prim, Type, I32};

use super::{Helper, TaskEmitter};

/// A word address: a sum of dynamic terms plus a constant offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Addr {
    terms: Vec<String>,
    offset: i64,
}

impl Addr {
    pub(crate) fn constant(offset: i64) -> Self {
        Self {
            terms: Vec::new(),
            offset,
        }
    }

    /// Add `value * scale`.
    pub(crate) fn add(&mut self, value: &Operand, scale: i64, render: &str) {
        match value.as_const().and_then(|l| l.as_i64()) {
            Some(v) => self.offset += v * scale,
            None if scale == 1 => self.terms.push(render.to_string()),
            None => self.terms.push(format!("{} * {}", render, scale)),
        }
    }

    /// The dynamic part, if any.
    pub(crate) fn dynamic(&self) -> Option<String> {
        (!self.terms.is_empty()).then(|| self.terms.join(" + "))
    }

    pub(crate) fn with_base(base: String, offset: i64) -> Self {
        Self {
            terms: vec![base],
            offset,
        }
    }

    pub(crate) fn offset(&self) -> i64 {
        self.offset
    }

    /// Address of word `k` past this one.
    pub(crate) fn word(&self, k: u32) -> String {
        let offset = self.offset + k as i64;
        match self.dynamic() {
            None => offset.to_string(),
            Some(base) if offset == 0 => base,
            Some(base) if offset < 0 => format!("{} - {}", base, -offset),
            Some(base) => format!("{} + {}", base, offset),
        }
    }
}

/// A word in a storage buffer.
#[derive(Clone, Debug)]
pub(crate) struct Word {
    pub(crate) target: String,
    pub(crate) atomic: bool,
}

impl Word {
    pub(crate) fn load(&self) -> String {
        if self.atomic {
            format!("atomicLoad(&{})", self.target)
        } else {
            self.target.clone()
        }
    }

    pub(crate) fn store(&self, value: &str) -> String {
        if self.atomic {
            format!("atomicStore(&{}, {});", self.target, value)
        } else {
            format!("{} = {};", self.target, value)
        }
    }
}

/// The zero value of a type.
pub(crate) fn zero(ty: &Type) -> String {
    match ty {
        Type::Scalar(p) => Literal::I32(0).cast(*p).wgsl(),
        other => format!("{}()", other.wgsl()),
    }
}

/// Interpret a raw `i32` word as `prim`.
pub(crate) fn decode(word: &str, prim: Prim) -> String {
    match prim {
        Prim::I32 => word.to_string(),
        other => format!("bitcast<{}>({})", other, word),
    }
}

/// Raw `i32` word of a `prim` value.
pub(crate) fn encode(value: &str, prim: Prim) -> String {
    match prim {
        Prim::I32 => value.to_string(),
        _ => format!("bitcast<i32>({})", value),
    }
}

/// Row-major component `k` of a named value.
pub(crate) fn component(value: &str, ty: &Type, k: u32) -> String {
    match ty {
        Type::Vector(..) => format!("{}[{}]", value, k),
        Type::Matrix(_, _, m) => {
            let (r, c) = (k / *m as u32, k % *m as u32);
            format!("{}[{}][{}]", value, c, r)
        }
        _ => value.to_string(),
    }
}

/// Construct a value of `ty` from row-major scalar components.
pub(crate) fn compose(ty: &Type, parts: &[String]) -> String {
    match ty {
        Type::Scalar(_) => parts.first().cloned().unwrap_or_else(|| zero(ty)),
        Type::Vector(..) => format!("{}({})", ty.wgsl(), parts.join(", ")),
        Type::Matrix(_, n, m) => {
            let (n, m) = (usize::from(*n), usize::from(*m));
            // WGSL matrix constructors take columns first.
            let mut column_major = Vec::with_capacity(parts.len());
            for c in 0..m {
                for r in 0..n {
                    if let Some(part) = parts.get(r * m + c) {
                        column_major.push(part.clone());
                    }
                }
            }
            format!("{}({})", ty.wgsl(), column_major.join(", "))
        }
        Type::Struct(_) => zero(ty),
    }
}

/// Row `r` of a matrix value with `m` columns.
pub(crate) fn matrix_row(value: &str, prim: Prim, m: usize, r: &str) -> String {
    let parts: Vec<String> = (0..m).map(|c| format!("{}[{}][{}]", value, c, r)).collect();
    format!("vec{}<{}>({})", m, prim, parts.join(", "))
}

/// Apply `f` to matching columns of two matrices.
fn per_column(ty: &Type, m: usize, f: impl Fn(usize) -> String) -> String {
    let columns: Vec<String> = (0..m).map(f).collect();
    format!("{}({})", ty.wgsl(), columns.join(", "))
}

impl<'a> TaskEmitter<'a> {
    pub(crate) fn operand(&self, op: &Operand) -> String {
        match op {
            Operand::Const(lit) => lit.wgsl(),
            Operand::Stmt(id) => self
                .names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("_{}", id.0)),
        }
    }

    /// An operand in index position; integer constants print bare.
    pub(crate) fn index(&self, op: &Operand) -> String {
        match op.as_const() {
            Some(Literal::I32(v)) if v >= 0 => v.to_string(),
            Some(Literal::U32(v)) => v.to_string(),
            _ => self.operand(op),
        }
    }

    pub(crate) fn operand_type(&self, op: &Operand) -> Type {
        match op {
            Operand::Const(lit) => lit.ty(),
            Operand::Stmt(id) => self.types.get(id).cloned().unwrap_or(I32),
        }
    }

    /// Truthiness test of a condition operand.
    pub(crate) fn condition(&self, op: &Operand) -> String {
        if let Some(lit) = op.as_const() {
            return lit.is_truthy().to_string();
        }
        let ty = self.operand_type(op);
        let test = format!("{} != {}", self.operand(op), zero(&ty));
        if ty.is_scalar() {
            test
        } else {
            format!("any({})", test)
        }
    }

    /// Read a value of `ty` from consecutive words.
    pub(crate) fn read_words(&self, ty: &Type, word: impl Fn(u32) -> Word) -> String {
        let prim = ty.prim().unwrap_or(Prim::I32);
        let parts: Vec<String> = (0..ty.component_count())
            .map(|k| decode(&word(k).load(), prim))
            .collect();
        compose(ty, &parts)
    }

    /// Lines storing `value: ty` into consecutive words.
    pub(crate) fn write_words(&self, ty: &Type, value: &str, word: impl Fn(u32) -> Word) -> Vec<String> {
        let prim = ty.prim().unwrap_or(Prim::I32);
        (0..ty.component_count())
            .map(|k| word(k).store(&encode(&component(value, ty, k), prim)))
            .collect()
    }

    // ─── Operators ────────────────────────────────────────────────

    pub(crate) fn binary_expr(
        &mut self,
        op: BinOp,
        lhs: &Operand,
        rhs: &Operand,
        operand_ty: &Type,
        ty: &Type,
    ) -> String {
        let a = self.operand(lhs);
        let b = self.operand(rhs);

        if op == BinOp::MatMul {
            return format!("({} * {})", a, b);
        }
        if op.is_comparison() {
            return format!("{}({} {} {})", ty.wgsl(), a, op.symbol(), b);
        }
        if op.is_logical() {
            let z = zero(operand_ty);
            let joiner = match (op, operand_ty.is_scalar()) {
                (BinOp::LogicalAnd, true) => "&&",
                (BinOp::LogicalAnd, false) => "&",
                (_, true) => "||",
                (_, false) => "|",
            };
            return format!("{}(({} != {}) {} ({} != {}))", ty.wgsl(), a, z, joiner, b, z);
        }

        let prim = operand_ty.prim().unwrap_or(Prim::I32);
        match (op, operand_ty) {
            (BinOp::Shl | BinOp::Shr, Type::Vector(_, n)) => {
                format!("({} {} (vec{n}<u32>({}) & vec{n}<u32>(31u)))", a, op.symbol(), b)
            }
            (BinOp::Shl | BinOp::Shr, _) => format!("({} {} (u32({}) & 31u))", a, op.symbol(), b),
            (BinOp::Pow, Type::Matrix(_, _, m)) => {
                per_column(ty, usize::from(*m), |c| format!("pow({a}[{c}], {b}[{c}])"))
            }
            (BinOp::Pow, _) => format!("pow({}, {})", a, b),
            (BinOp::Mul | BinOp::Div | BinOp::Mod, Type::Matrix(_, _, m)) => {
                let sym = op.symbol();
                per_column(ty, usize::from(*m), |c| format!("({a}[{c}] {sym} {b}[{c}])"))
            }
            (BinOp::FloorDiv, _) => match prim {
                Prim::F32 => format!("floor({} / {})", a, b),
                Prim::U32 => format!("({} / {})", a, b),
                Prim::I32 => {
                    self.helpers.insert(Helper::FloorDiv);
                    match operand_ty {
                        Type::Vector(_, n) => {
                            let parts: Vec<String> = (0..*n)
                                .map(|k| format!("floor_div_i32({a}[{k}], {b}[{k}])"))
                                .collect();
                            format!("{}({})", ty.wgsl(), parts.join(", "))
                        }
                        _ => format!("floor_div_i32({}, {})", a, b),
                    }
                }
            },
            _ => format!("({} {} {})", a, op.symbol(), b),
        }
    }

    pub(crate) fn unary_expr(&self, op: UnaryOp, operand: &Operand, ty: &Type) -> String {
        let a = self.operand(operand);
        match op {
            UnaryOp::Neg => match ty {
                Type::Matrix(_, _, m) => per_column(ty, usize::from(*m), |c| format!("-{a}[{c}]")),
                _ => format!("(-({}))", a),
            },
            UnaryOp::Not => {
                let operand_ty = self.operand_type(operand);
                format!("{}({} == {})", ty.wgsl(), a, zero(&operand_ty))
            }
            UnaryOp::BitNot => format!("(~{})", a),
            UnaryOp::Cast(_) => format!("{}({})", ty.wgsl(), a),
            UnaryOp::Bitcast(_) => format!("bitcast<{}>({})", ty.wgsl(), a),
        }
    }
}
