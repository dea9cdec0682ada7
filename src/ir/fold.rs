//! Compile-time evaluation of scalar operators.
//!
//! Folding mirrors the device arithmetic: integers wrap, shifts use the
//! low five bits of the amount, and `%` truncates toward zero.

use crate::syntax::ast::BinOp;
use crate::types::Prim;

use super::{Literal, UnaryOp};

/// Evaluate `a op b` after converting both sides to `operand`.
///
/// Returns `None` when the operation has no compile-time value, such as an
/// integer division by zero.
pub fn fold_binary(op: BinOp, a: Literal, b: Literal, operand: Prim, result: Prim) -> Option<Literal> {
    let a = a.cast(operand);
    let b = b.cast(operand);

    if op.is_comparison() {
        let truth = match (a, b) {
            (Literal::I32(x), Literal::I32(y)) => compare(op, x, y),
            (Literal::U32(x), Literal::U32(y)) => compare(op, x, y),
            (Literal::F32(x), Literal::F32(y)) => compare(op, x, y),
            _ => return None,
        };
        return Some(Literal::I32(truth as i32).cast(result));
    }
    if op.is_logical() {
        let truth = match op {
            BinOp::LogicalAnd => a.is_truthy() && b.is_truthy(),
            _ => a.is_truthy() || b.is_truthy(),
        };
        return Some(Literal::I32(truth as i32).cast(result));
    }

    let value = match (a, b) {
        (Literal::I32(x), Literal::I32(y)) => Literal::I32(fold_i32(op, x, y)?),
        (Literal::U32(x), Literal::U32(y)) => Literal::U32(fold_u32(op, x, y)?),
        (Literal::F32(x), Literal::F32(y)) => Literal::F32(fold_f32(op, x, y)?),
        _ => return None,
    };
    Some(value.cast(result))
}

fn compare<T: PartialOrd>(op: BinOp, x: T, y: T) -> bool {
    match op {
        BinOp::Eq => x == y,
        BinOp::Ne => x != y,
        BinOp::Lt => x < y,
        BinOp::Le => x <= y,
        BinOp::Gt => x > y,
        _ => x >= y,
    }
}

fn fold_i32(op: BinOp, x: i32, y: i32) -> Option<i32> {
    Some(match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Mod if y == 0 => return None,
        BinOp::Mod => x.wrapping_rem(y),
        BinOp::FloorDiv if y == 0 => return None,
        BinOp::FloorDiv => {
            let q = x.wrapping_div(y);
            if (x % y != 0) && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::Shl => x.wrapping_shl(y as u32 & 31),
        BinOp::Shr => x.wrapping_shr(y as u32 & 31),
        _ => return None,
    })
}

fn fold_u32(op: BinOp, x: u32, y: u32) -> Option<u32> {
    Some(match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Mod | BinOp::FloorDiv if y == 0 => return None,
        BinOp::Mod => x % y,
        BinOp::FloorDiv => x / y,
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::Shl => x.wrapping_shl(y & 31),
        BinOp::Shr => x.wrapping_shr(y & 31),
        _ => return None,
    })
}

fn fold_f32(op: BinOp, x: f32, y: f32) -> Option<f32> {
    Some(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Mod => x % y,
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Pow => x.powf(y),
        _ => return None,
    })
}

/// Evaluate a unary operator on a constant.
pub fn fold_unary(op: UnaryOp, value: Literal) -> Option<Literal> {
    Some(match (op, value) {
        (UnaryOp::Neg, Literal::I32(v)) => Literal::I32(v.wrapping_neg()),
        (UnaryOp::Neg, Literal::F32(v)) => Literal::F32(-v),
        (UnaryOp::Neg, Literal::U32(_)) => return None,
        (UnaryOp::Not, v) => Literal::I32(!v.is_truthy() as i32),
        (UnaryOp::BitNot, Literal::I32(v)) => Literal::I32(!v),
        (UnaryOp::BitNot, Literal::U32(v)) => Literal::U32(!v),
        (UnaryOp::BitNot, Literal::F32(_)) => return None,
        (UnaryOp::Cast(prim), v) => v.cast(prim),
        (UnaryOp::Bitcast(prim), v) => v.bitcast(prim),
    })
}
