//! Value plumbing shared by the statement and expression lowerers:
//! conversions, loads and stores, folded arithmetic.

use crate::error::CompileError;
use crate::ir::{
    fold_binary, fold_unary, AtomicKind, AtomicTarget, Literal, Operand, StmtId, StmtKind, UnaryOp,
};
use crate::scope::{FieldInfo, Value};
use crate::syntax::ast::{BinOp, UnOp};
use crate::syntax::span::Span;
use crate::types::{binary_types, unary_type, Prim, Type, I32};

use super::{Lowered, Lowerer, Place};

impl<'a> Lowerer<'a> {
    // ─── Scope values ─────────────────────────────────────────────

    pub(crate) fn from_value(&mut self, value: &Value) -> Lowered {
        match value {
            Value::Place(place) => Lowered::Place(place.clone()),
            Value::Bound(op, ty) => Lowered::Value(*op, ty.clone()),
            Value::Arg { index, ty } => {
                let op = self.emit_value(StmtKind::ArgLoad {
                    index: *index,
                    ty: ty.clone(),
                });
                Lowered::Value(op, ty.clone())
            }
            other => Lowered::Static(other.clone()),
        }
    }

    /// The compile-time value of `lowered`, if it has one.
    pub(crate) fn static_value(lowered: &Lowered) -> Option<Value> {
        match lowered {
            Lowered::Static(v) => Some(v.clone()),
            Lowered::Value(Operand::Const(lit), _) => Some(Value::Number(*lit)),
            _ => None,
        }
    }

    // ─── Rvalues ──────────────────────────────────────────────────

    /// Materialize a scalar, vector or matrix value.
    pub(crate) fn rvalue(&mut self, lowered: Lowered, span: Span) -> Result<(Operand, Type), CompileError> {
        match lowered {
            Lowered::Value(op, ty) => Ok((op, ty)),
            Lowered::Place(place) => self.load(&place, span),
            Lowered::Static(Value::Number(lit)) => Ok((Operand::Const(lit), lit.ty())),
            Lowered::Static(Value::NumberArray { values, ty }) => {
                let parts = values.into_iter().map(Operand::Const).collect();
                let op = self.emit_value(StmtKind::Compose {
                    parts,
                    ty: ty.clone(),
                });
                Ok((op, ty))
            }
            other => Err(CompileError::UnsupportedSyntax {
                what: format!("using a {} as a number", other.kind_name()),
                span,
            }),
        }
    }

    /// A scalar integer operand, for indices and loop bounds.
    pub(crate) fn int_operand(&mut self, lowered: Lowered, span: Span) -> Result<Operand, CompileError> {
        let (op, ty) = self.rvalue(lowered, span)?;
        match ty {
            Type::Scalar(Prim::I32) => Ok(op),
            Type::Scalar(Prim::U32) => Ok(self.cast_scalar(op, Prim::U32, Prim::I32)),
            Type::Scalar(Prim::F32) => {
                if let Some(v) = op.as_const().and_then(|l| l.as_i64()) {
                    return Ok(Operand::Const(Literal::I32(v as i32)));
                }
                Err(CompileError::InvalidOperand {
                    op: "[]".to_string(),
                    ty: ty.to_string(),
                    span,
                })
            }
            other => Err(CompileError::InvalidOperand {
                op: "[]".to_string(),
                ty: other.to_string(),
                span,
            }),
        }
    }

    fn cast_scalar(&mut self, op: Operand, from: Prim, to: Prim) -> Operand {
        if from == to {
            return op;
        }
        if let Some(lit) = op.as_const() {
            return Operand::Const(lit.cast(to));
        }
        self.emit_value(StmtKind::UnaryOp {
            op: UnaryOp::Cast(to),
            operand: op,
            ty: Type::Scalar(to),
        })
    }

    /// Convert `op: from` to `to`: element casts and scalar splats.
    pub(crate) fn coerce(
        &mut self,
        op: Operand,
        from: &Type,
        to: &Type,
        span: Span,
    ) -> Result<Operand, CompileError> {
        if from == to {
            return Ok(op);
        }
        let mismatch = || CompileError::ShapeMismatch {
            lhs: to.clone(),
            rhs: from.clone(),
            span,
        };
        let (from_prim, to_prim) = match (from.prim(), to.prim()) {
            (Some(f), Some(t)) => (f, t),
            _ => return Err(mismatch()),
        };
        match (from, to) {
            (Type::Scalar(_), Type::Scalar(_)) => Ok(self.cast_scalar(op, from_prim, to_prim)),
            (Type::Scalar(_), Type::Vector(..) | Type::Matrix(..)) => {
                let scalar = self.cast_scalar(op, from_prim, to_prim);
                let parts = vec![scalar; to.component_count() as usize];
                Ok(self.emit_value(StmtKind::Compose {
                    parts,
                    ty: to.clone(),
                }))
            }
            (Type::Vector(_, a), Type::Vector(_, b)) if a == b => {
                Ok(self.emit_value(StmtKind::UnaryOp {
                    op: UnaryOp::Cast(to_prim),
                    operand: op,
                    ty: to.clone(),
                }))
            }
            (Type::Matrix(_, n1, m1), Type::Matrix(_, n2, m2)) if n1 == n2 && m1 == m2 => Ok(op),
            _ => Err(mismatch()),
        }
    }

    // ─── Loads and stores ─────────────────────────────────────────

    fn global_ptr(&mut self, field: &FieldInfo, indices: &[Operand], offset: Operand) -> StmtId {
        self.emit(StmtKind::GlobalPtr {
            field: field.id,
            indices: indices.to_vec(),
            offset,
        })
    }

    pub(crate) fn load(&mut self, place: &Place, span: Span) -> Result<(Operand, Type), CompileError> {
        let ty = place.ty().clone();
        if ty.is_struct() {
            return Err(CompileError::UnsupportedSyntax {
                what: "using a whole struct as a number".to_string(),
                span,
            });
        }
        let op = match place {
            Place::Local { slot, indices, .. } => self.emit_value(StmtKind::LocalLoad {
                slot: *slot,
                indices: indices.clone(),
                ty: ty.clone(),
            }),
            Place::Global {
                field,
                indices,
                offset,
                ..
            } => {
                let ptr = self.global_ptr(field, indices, *offset);
                self.emit_value(StmtKind::GlobalLoad {
                    ptr,
                    ty: ty.clone(),
                })
            }
        };
        Ok((op, ty))
    }

    /// Read a struct-typed place member by member.
    pub(crate) fn load_record(&mut self, place: &Place) -> Option<Lowered> {
        let Type::Struct(st) = place.ty() else {
            return None;
        };
        let mut entries = Vec::new();
        for (name, _) in &st.fields {
            let member = self.member_place(place, name).ok()?;
            entries.push((name.clone(), Lowered::Place(member)));
        }
        Some(Lowered::Record(entries))
    }

    /// Store a lowered value into a place, converting to the place type.
    pub(crate) fn store(&mut self, place: &Place, value: Lowered, span: Span) -> Result<(), CompileError> {
        if let Type::Struct(st) = place.ty() {
            let entries = match value {
                Lowered::Record(entries) => entries,
                Lowered::Static(Value::Record(record)) => record
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.from_value(v)))
                    .collect(),
                Lowered::Place(src) if src.ty() == place.ty() => match self.load_record(&src) {
                    Some(Lowered::Record(entries)) => entries,
                    _ => Vec::new(),
                },
                other => {
                    return Err(CompileError::InvalidAssignment {
                        what: format!("a struct from a {}", other.kind_name()),
                        span,
                    })
                }
            };
            for (name, _) in st.fields.clone() {
                let Some((_, member_value)) = entries.iter().find(|(k, _)| *k == name) else {
                    return Err(CompileError::UnknownField {
                        name,
                        ty: "struct value".to_string(),
                        span,
                    });
                };
                let member = self.member_place(place, &name)?;
                self.store(&member, member_value.clone(), span)?;
            }
            return Ok(());
        }

        let (op, ty) = self.rvalue(value, span)?;
        let target_ty = place.ty().clone();
        let op = self.coerce(op, &ty, &target_ty, span)?;
        match place {
            Place::Local { slot, indices, .. } => {
                self.emit(StmtKind::LocalStore {
                    slot: *slot,
                    indices: indices.clone(),
                    value: op,
                });
            }
            Place::Global {
                field,
                indices,
                offset,
                ..
            } => {
                let ptr = self.global_ptr(field, indices, *offset);
                self.emit(StmtKind::GlobalStore { ptr, value: op });
            }
        }
        Ok(())
    }

    /// Atomic read-modify-write on a scalar place; yields the old value.
    pub(crate) fn atomic(
        &mut self,
        place: &Place,
        kind: AtomicKind,
        value: Lowered,
        span: Span,
    ) -> Result<(Operand, Type), CompileError> {
        let ty = place.ty().clone();
        let Type::Scalar(prim) = ty else {
            return Err(CompileError::InvalidOperand {
                op: kind.wgsl_builtin().to_string(),
                ty: ty.to_string(),
                span,
            });
        };
        if prim.is_float() && matches!(kind, AtomicKind::And | AtomicKind::Or | AtomicKind::Xor) {
            return Err(CompileError::InvalidOperand {
                op: kind.wgsl_builtin().to_string(),
                ty: ty.to_string(),
                span,
            });
        }
        let (op, value_ty) = self.rvalue(value, span)?;
        let op = self.coerce(op, &value_ty, &ty, span)?;
        let target = match place {
            Place::Local { slot, indices, .. } => AtomicTarget::Local {
                slot: *slot,
                indices: indices.clone(),
            },
            Place::Global {
                field,
                indices,
                offset,
                ..
            } => AtomicTarget::Global {
                field: field.id,
                ptr: self.global_ptr(field, indices, *offset),
            },
        };
        let old = self.emit_value(StmtKind::AtomicOp {
            target,
            op: kind,
            value: op,
            ty: ty.clone(),
        });
        Ok((old, ty))
    }

    /// A fresh local slot holding `value`.
    pub(crate) fn alloc_slot(
        &mut self,
        value: Lowered,
        hint: &str,
        span: Span,
    ) -> Result<Place, CompileError> {
        let (op, ty) = self.rvalue(value, span)?;
        let slot = self.emit(StmtKind::Alloca {
            ty: ty.clone(),
            hint: sanitize_hint(hint),
        });
        self.emit(StmtKind::LocalStore {
            slot,
            indices: Vec::new(),
            value: op,
        });
        Ok(Place::Local {
            slot,
            slot_ty: ty.clone(),
            indices: Vec::new(),
            ty,
        })
    }

    // ─── Operators ────────────────────────────────────────────────

    pub(crate) fn binary(
        &mut self,
        op: BinOp,
        lhs: (Operand, Type),
        rhs: (Operand, Type),
        span: Span,
    ) -> Result<(Operand, Type), CompileError> {
        let (operand_ty, ty) =
            binary_types(op, &lhs.1, &rhs.1).map_err(|e| CompileError::from_type(e, span))?;

        if op == BinOp::MatMul {
            let l = self.coerce(lhs.0, &lhs.1, &lhs.1.with_prim(Prim::F32), span)?;
            let r = self.coerce(rhs.0, &rhs.1, &rhs.1.with_prim(Prim::F32), span)?;
            let result = self.emit_value(StmtKind::BinaryOp {
                op,
                lhs: l,
                rhs: r,
                operand_ty,
                ty: ty.clone(),
            });
            return Ok((result, ty));
        }

        let l = self.coerce(lhs.0, &lhs.1, &operand_ty, span)?;
        let r = self.coerce(rhs.0, &rhs.1, &operand_ty, span)?;
        if let (Some(a), Some(b), Type::Scalar(p_op), Type::Scalar(p_res)) =
            (l.as_const(), r.as_const(), &operand_ty, &ty)
        {
            if let Some(lit) = fold_binary(op, a, b, *p_op, *p_res) {
                return Ok((Operand::Const(lit), ty));
            }
        }
        let result = self.emit_value(StmtKind::BinaryOp {
            op,
            lhs: l,
            rhs: r,
            operand_ty,
            ty: ty.clone(),
        });
        Ok((result, ty))
    }

    pub(crate) fn unary(
        &mut self,
        op: UnOp,
        operand: (Operand, Type),
        span: Span,
    ) -> Result<(Operand, Type), CompileError> {
        let ty = unary_type(op, &operand.1).map_err(|e| CompileError::from_type(e, span))?;
        let ir_op = match op {
            UnOp::Plus => return Ok((operand.0, ty)),
            UnOp::Neg => UnaryOp::Neg,
            UnOp::Not => UnaryOp::Not,
            UnOp::BitNot => UnaryOp::BitNot,
        };
        Ok((self.unary_ir(ir_op, operand.0, ty.clone()), ty))
    }

    pub(crate) fn unary_ir(&mut self, op: UnaryOp, operand: Operand, ty: Type) -> Operand {
        if ty.is_scalar() {
            if let Some(lit) = operand.as_const().and_then(|l| fold_unary(op, l)) {
                return Operand::Const(lit);
            }
        }
        self.emit_value(StmtKind::UnaryOp { op, operand, ty })
    }

    /// Folded i32 arithmetic for addresses and loop bounds.
    pub(crate) fn int_binary(&mut self, op: BinOp, a: Operand, b: Operand) -> Operand {
        if let (Some(x), Some(y)) = (a.as_const(), b.as_const()) {
            if let Some(lit) = fold_binary(op, x, y, Prim::I32, Prim::I32) {
                return Operand::Const(lit);
            }
        }
        match (op, a.as_const(), b.as_const()) {
            (BinOp::Add, Some(Literal::I32(0)), _) => return b,
            (BinOp::Add, _, Some(Literal::I32(0))) | (BinOp::Mul, _, Some(Literal::I32(1))) => {
                return a
            }
            (BinOp::Mul, Some(Literal::I32(1)), _) => return b,
            _ => {}
        }
        self.emit_value(StmtKind::BinaryOp {
            op,
            lhs: a,
            rhs: b,
            operand_ty: I32,
            ty: I32,
        })
    }

    /// Component `index` of a vector or matrix value.
    pub(crate) fn extract(&mut self, value: Operand, ty: &Type, indices: Vec<Operand>) -> (Operand, Type) {
        let out_ty = match (ty, indices.len()) {
            (Type::Matrix(p, _, m), 1) => Type::Vector(*p, *m),
            _ => ty.component_type(),
        };
        let op = self.emit_value(StmtKind::Extract {
            value,
            indices,
            ty: out_ty.clone(),
        });
        (op, out_ty)
    }

    /// Scalar components of a value, row-major.
    pub(crate) fn components(&mut self, value: Operand, ty: &Type) -> Vec<Operand> {
        match ty {
            Type::Scalar(_) => vec![value],
            Type::Vector(_, n) => (0..*n as i32)
                .map(|i| self.extract(value, ty, vec![Operand::Const(Literal::I32(i))]).0)
                .collect(),
            Type::Matrix(_, n, m) => {
                let mut out = Vec::new();
                for r in 0..*n as i32 {
                    for c in 0..*m as i32 {
                        let idx = vec![
                            Operand::Const(Literal::I32(r)),
                            Operand::Const(Literal::I32(c)),
                        ];
                        out.push(self.extract(value, ty, idx).0);
                    }
                }
                out
            }
            Type::Struct(_) => Vec::new(),
        }
    }
}

/// Identifier-safe suffix for generated variable names.
pub(crate) fn sanitize_hint(hint: &str) -> String {
    hint.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(24)
        .collect()
}
