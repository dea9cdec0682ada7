use std::sync::Arc;

use crate::error::CompileError;
use crate::ir::{Literal, Operand, StmtKind};
use crate::library;
use crate::scope::{FunctionSource, Scope, Value};
use crate::syntax::ast::{BinOp, Expr};
use crate::syntax::span::{Span, Spanned};
use crate::types::{broadcast, Prim, Type};

use super::helpers::sanitize_hint;
use super::{Lowered, Lowerer, Place};

/// Component index of a swizzle letter.
fn swizzle_index(c: char) -> Option<u8> {
    match c {
        'x' | 'r' => Some(0),
        'y' | 'g' => Some(1),
        'z' | 'b' => Some(2),
        'w' | 'a' => Some(3),
        _ => None,
    }
}

fn swizzle(name: &str, width: u8) -> Option<Vec<u8>> {
    if name.is_empty() || name.len() > 4 {
        return None;
    }
    name.chars()
        .map(|c| swizzle_index(c).filter(|i| *i < width))
        .collect()
}

fn const_i32(v: i32) -> Operand {
    Operand::Const(Literal::I32(v))
}

impl<'a> Lowerer<'a> {
    pub(crate) fn lower_expr(
        &mut self,
        expr: &Spanned<Expr>,
        scope: &mut Scope,
    ) -> Result<Lowered, CompileError> {
        let span = expr.span;
        match &expr.node {
            Expr::Int(v) => {
                let lit = if let Ok(v) = i32::try_from(*v) {
                    Literal::I32(v)
                } else if let Ok(v) = u32::try_from(*v) {
                    Literal::U32(v)
                } else {
                    return Err(CompileError::InvalidType {
                        message: format!("integer literal {} does not fit in 32 bits", v),
                        span,
                    });
                };
                Ok(Lowered::Static(Value::Number(lit)))
            }
            Expr::Float(v) => Ok(Lowered::Static(Value::Number(Literal::F32(*v as f32)))),
            Expr::Bool(b) => Ok(Lowered::Static(Value::Number(Literal::I32(*b as i32)))),
            Expr::Var(name) => match scope.get_stored(name).cloned() {
                Some(value) => Ok(self.from_value(&value)),
                None => Err(CompileError::UnresolvedSymbol {
                    name: name.clone(),
                    span,
                }),
            },
            Expr::This => match scope.receiver().cloned() {
                Some(value) => Ok(self.from_value(&value)),
                None => Err(CompileError::UnresolvedSymbol {
                    name: "this".to_string(),
                    span,
                }),
            },
            Expr::Member { base, name } => {
                if let Some(path) = expr.node.dotted_path() {
                    if let Some(value) = scope.try_evaluate(&path).cloned() {
                        return Ok(self.from_value(&value));
                    }
                    if let Some(v) = library::constant(&path) {
                        return Ok(Lowered::Static(Value::Number(Literal::F32(v))));
                    }
                }
                let base_value = self.lower_expr(base, scope)?;
                self.member(base_value, &name.node, name.span)
            }
            Expr::Index { base, indices } => {
                let base_value = self.lower_expr(base, scope)?;
                let mut ops = Vec::new();
                for index in indices {
                    let lowered = self.lower_expr(index, scope)?;
                    ops.extend(self.index_operands(lowered, index.span)?);
                }
                self.index(base_value, ops, span)
            }
            Expr::Call { callee, args } => self.lower_call(callee, args, scope, span),
            Expr::Unary { op, operand } => {
                let value = self.lower_expr(operand, scope)?;
                let value = self.rvalue(value, operand.span)?;
                let (op, ty) = self.unary(*op, value, span)?;
                Ok(Lowered::Value(op, ty))
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(lhs, scope)?;
                let l = self.rvalue(l, lhs.span)?;
                let r = self.lower_expr(rhs, scope)?;
                let r = self.rvalue(r, rhs.span)?;
                let (op, ty) = self.binary(*op, l, r, span)?;
                Ok(Lowered::Value(op, ty))
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.lower_conditional(cond, then_expr, else_expr, scope, span),
            Expr::Array(elems) => self.lower_array(elems, scope, span),
            Expr::Object(fields) => {
                let mut entries = Vec::new();
                for (name, value) in fields {
                    let lowered = self.lower_expr(value, scope)?;
                    let lowered = match lowered {
                        Lowered::Place(place) => match self.load_record(&place) {
                            Some(record) => record,
                            None => {
                                let (op, ty) = self.load(&place, value.span)?;
                                Lowered::Value(op, ty)
                            }
                        },
                        other => other,
                    };
                    entries.push((name.node.clone(), lowered));
                }
                Ok(Lowered::Record(entries))
            }
            Expr::Arrow(decl) => Ok(Lowered::Static(Value::Function(Arc::new(FunctionSource {
                name: "<arrow>".to_string(),
                decl: decl.clone(),
            })))),
        }
    }

    /// Scalar index operands; an integer vector index spreads into its
    /// components.
    fn index_operands(&mut self, lowered: Lowered, span: Span) -> Result<Vec<Operand>, CompileError> {
        if let Lowered::Static(Value::NumberArray { values, ty }) = &lowered {
            if ty.is_vector() {
                return values
                    .iter()
                    .map(|lit| self.int_operand(Lowered::Static(Value::Number(*lit)), span))
                    .collect();
            }
        }
        let is_vector = match &lowered {
            Lowered::Value(_, ty) => ty.is_vector(),
            Lowered::Place(place) => place.ty().is_vector(),
            _ => false,
        };
        if is_vector {
            let (op, ty) = self.rvalue(lowered, span)?;
            let parts = self.components(op, &ty);
            let prim = ty.prim().unwrap_or(Prim::I32);
            return parts
                .into_iter()
                .map(|part| self.int_operand(Lowered::Value(part, Type::Scalar(prim)), span))
                .collect();
        }
        Ok(vec![self.int_operand(lowered, span)?])
    }

    // ─── Member access ────────────────────────────────────────────

    pub(crate) fn member(&mut self, base: Lowered, name: &str, span: Span) -> Result<Lowered, CompileError> {
        let unknown = |ty: String| CompileError::UnknownField {
            name: name.to_string(),
            ty,
            span,
        };
        match base {
            Lowered::Static(Value::Record(record)) => match record.get(name) {
                Some(value) => {
                    let value = value.clone();
                    Ok(self.from_value(&value))
                }
                None => Err(unknown("record".to_string())),
            },
            Lowered::Record(entries) => entries
                .into_iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
                .ok_or_else(|| unknown("struct value".to_string())),
            Lowered::Static(Value::NumberArray { values, ty }) if ty.is_vector() => {
                let width = ty.component_count() as u8;
                let picks = swizzle(name, width).ok_or_else(|| unknown(ty.to_string()))?;
                if picks.len() == 1 {
                    return Ok(Lowered::Static(Value::Number(values[picks[0] as usize])));
                }
                let prim = ty.prim().unwrap_or(Prim::F32);
                Ok(Lowered::Static(Value::NumberArray {
                    values: picks.iter().map(|i| values[*i as usize]).collect(),
                    ty: Type::Vector(prim, picks.len() as u8),
                }))
            }
            Lowered::Place(place) => {
                if place.ty().is_struct() {
                    return Ok(Lowered::Place(self.member_place(&place, name)?));
                }
                let Type::Vector(prim, width) = place.ty().clone() else {
                    return Err(unknown(place.ty().to_string()));
                };
                let picks = swizzle(name, width).ok_or_else(|| unknown(place.ty().to_string()))?;
                if picks.len() == 1 {
                    return Ok(Lowered::Place(self.sub_place(
                        &place,
                        vec![const_i32(picks[0] as i32)],
                        span,
                    )?));
                }
                let (op, ty) = self.load(&place, span)?;
                Ok(self.swizzle_value(op, &ty, &picks, prim))
            }
            Lowered::Value(op, ty) => match &ty {
                Type::Vector(prim, width) => {
                    let prim = *prim;
                    let picks = swizzle(name, *width).ok_or_else(|| unknown(ty.to_string()))?;
                    Ok(self.swizzle_value(op, &ty, &picks, prim))
                }
                other => Err(unknown(other.to_string())),
            },
            other => Err(unknown(other.kind_name().to_string())),
        }
    }

    fn swizzle_value(&mut self, op: Operand, ty: &Type, picks: &[u8], prim: Prim) -> Lowered {
        let parts: Vec<Operand> = picks
            .iter()
            .map(|i| self.extract(op, ty, vec![const_i32(*i as i32)]).0)
            .collect();
        if parts.len() == 1 {
            return Lowered::Value(parts[0], Type::Scalar(prim));
        }
        let out = Type::Vector(prim, parts.len() as u8);
        let op = self.emit_value(StmtKind::Compose {
            parts,
            ty: out.clone(),
        });
        Lowered::Value(op, out)
    }

    /// A struct member of a struct-typed place.
    pub(crate) fn member_place(&mut self, place: &Place, name: &str) -> Result<Place, CompileError> {
        let (member_offset, member_ty) = place
            .ty()
            .member(name)
            .map_err(|e| CompileError::from_type(e, Span::dummy()))?;
        match place {
            Place::Global {
                field,
                indices,
                offset,
                ..
            } => {
                let offset = self.int_binary(BinOp::Add, *offset, const_i32(member_offset as i32));
                Ok(Place::Global {
                    field: field.clone(),
                    indices: indices.clone(),
                    offset,
                    ty: member_ty,
                })
            }
            Place::Local { .. } => Err(CompileError::UnsupportedSyntax {
                what: "struct-typed local".to_string(),
                span: Span::dummy(),
            }),
        }
    }

    // ─── Indexing ─────────────────────────────────────────────────

    pub(crate) fn index(&mut self, base: Lowered, indices: Vec<Operand>, span: Span) -> Result<Lowered, CompileError> {
        match base {
            Lowered::Static(Value::Field(field)) => {
                if indices.len() != field.shape.len() {
                    return Err(CompileError::InvalidType {
                        message: format!(
                            "field `{}` has {} dimension(s) but is indexed with {}",
                            field.name,
                            field.shape.len(),
                            indices.len()
                        ),
                        span,
                    });
                }
                let ty = field.elem.clone();
                self.fields.entry(field.id).or_insert_with(|| field.clone());
                Ok(Lowered::Place(Place::Global {
                    field,
                    indices,
                    offset: const_i32(0),
                    ty,
                }))
            }
            Lowered::Place(place) => Ok(Lowered::Place(self.sub_place(&place, indices, span)?)),
            Lowered::Static(Value::NumberArray { values, ty }) => {
                let consts: Option<Vec<i64>> = indices
                    .iter()
                    .map(|op| op.as_const().and_then(|l| l.as_i64()))
                    .collect();
                if let Some(consts) = consts {
                    if let Some(value) = static_index(&values, &ty, &consts) {
                        return Ok(Lowered::Static(value));
                    }
                    return Err(CompileError::InvalidType {
                        message: format!("index out of range for {}", ty),
                        span,
                    });
                }
                let (op, ty) = self.rvalue(Lowered::Static(Value::NumberArray { values, ty }), span)?;
                self.index_value(op, &ty, indices, span)
            }
            Lowered::Value(op, ty) => self.index_value(op, &ty, indices, span),
            Lowered::Static(Value::Texture(tex)) => Err(CompileError::UnsupportedSyntax {
                what: format!("indexing texture `{}` (use textureLoad)", tex.name),
                span,
            }),
            other => Err(CompileError::UnsupportedSyntax {
                what: format!("indexing a {}", other.kind_name()),
                span,
            }),
        }
    }

    fn index_value(&mut self, op: Operand, ty: &Type, indices: Vec<Operand>, span: Span) -> Result<Lowered, CompileError> {
        let ok = match ty {
            Type::Vector(..) => indices.len() == 1,
            Type::Matrix(..) => indices.len() == 1 || indices.len() == 2,
            _ => false,
        };
        if !ok {
            return Err(CompileError::InvalidType {
                message: format!("{} cannot be indexed with {} index(es)", ty, indices.len()),
                span,
            });
        }
        let (op, ty) = self.extract(op, ty, indices);
        Ok(Lowered::Value(op, ty))
    }

    /// Narrow a place to a component, matrix row or matrix element.
    pub(crate) fn sub_place(&mut self, place: &Place, indices: Vec<Operand>, span: Span) -> Result<Place, CompileError> {
        let bad = |ty: &Type| CompileError::InvalidType {
            message: format!("{} cannot be indexed with {} index(es)", ty, indices.len()),
            span,
        };
        let ty = place.ty().clone();
        let new_ty = match (&ty, indices.len()) {
            (Type::Vector(p, _), 1) => Type::Scalar(*p),
            (Type::Matrix(p, _, m), 1) => Type::Vector(*p, *m),
            (Type::Matrix(p, _, _), 2) => Type::Scalar(*p),
            _ => return Err(bad(&ty)),
        };
        match place {
            Place::Local {
                slot,
                slot_ty,
                indices: path,
                ..
            } => {
                let mut path = path.clone();
                path.extend(indices);
                Ok(Place::Local {
                    slot: *slot,
                    slot_ty: slot_ty.clone(),
                    indices: path,
                    ty: new_ty,
                })
            }
            Place::Global {
                field,
                indices: elem,
                offset,
                ..
            } => {
                let cols = match ty {
                    Type::Matrix(_, _, m) => m as i32,
                    _ => 1,
                };
                let step = if ty.is_matrix() {
                    let row = self.int_binary(BinOp::Mul, indices[0], const_i32(cols));
                    match indices.get(1) {
                        Some(col) => self.int_binary(BinOp::Add, row, *col),
                        None => row,
                    }
                } else {
                    indices[0]
                };
                let offset = self.int_binary(BinOp::Add, *offset, step);
                Ok(Place::Global {
                    field: field.clone(),
                    indices: elem.clone(),
                    offset,
                    ty: new_ty,
                })
            }
        }
    }

    // ─── Composite literals ───────────────────────────────────────

    fn lower_array(&mut self, elems: &[Spanned<Expr>], scope: &mut Scope, span: Span) -> Result<Lowered, CompileError> {
        let mut items = Vec::new();
        for elem in elems {
            items.push((self.lower_expr(elem, scope)?, elem.span));
        }

        let statics: Option<Vec<Value>> = items.iter().map(|(l, _)| Self::static_value(l)).collect();
        if let Some(values) = statics {
            if let Some(value) = static_array(&values).map_err(|e| CompileError::from_type(e, span))? {
                return Ok(Lowered::Static(value));
            }
        }

        let mut values = Vec::new();
        for (item, item_span) in items {
            values.push(self.rvalue(item, item_span)?);
        }
        let Some((_, first_ty)) = values.first().cloned() else {
            return Err(CompileError::InvalidType {
                message: "empty array literal".to_string(),
                span,
            });
        };
        match first_ty {
            Type::Scalar(_) => {
                let mut elem = first_ty.clone();
                for (_, ty) in &values[1..] {
                    elem = broadcast(&elem, ty).map_err(|e| CompileError::from_type(e, span))?;
                }
                let ty = Type::vector(elem.prim().unwrap_or(Prim::F32), values.len())
                    .map_err(|e| CompileError::from_type(e, span))?;
                let mut parts = Vec::new();
                for (op, op_ty) in values {
                    if !op_ty.is_scalar() {
                        return Err(CompileError::ShapeMismatch {
                            lhs: first_ty.clone(),
                            rhs: op_ty,
                            span,
                        });
                    }
                    parts.push(self.coerce(op, &op_ty, &elem, span)?);
                }
                let op = self.emit_value(StmtKind::Compose {
                    parts,
                    ty: ty.clone(),
                });
                Ok(Lowered::Value(op, ty))
            }
            Type::Vector(_, cols) => {
                let ty = Type::matrix(values.len(), cols as usize)
                    .map_err(|e| CompileError::from_type(e, span))?;
                let row_ty = Type::Vector(Prim::F32, cols);
                let mut parts = Vec::new();
                for (op, op_ty) in values {
                    if !op_ty.is_vector() || op_ty.component_count() != cols as u32 {
                        return Err(CompileError::ShapeMismatch {
                            lhs: first_ty.clone(),
                            rhs: op_ty,
                            span,
                        });
                    }
                    let row = self.coerce(op, &op_ty, &row_ty, span)?;
                    parts.extend(self.components(row, &row_ty));
                }
                let op = self.emit_value(StmtKind::Compose {
                    parts,
                    ty: ty.clone(),
                });
                Ok(Lowered::Value(op, ty))
            }
            other => Err(CompileError::InvalidType {
                message: format!("array of {}", other),
                span,
            }),
        }
    }

    fn lower_conditional(
        &mut self,
        cond: &Spanned<Expr>,
        then_expr: &Spanned<Expr>,
        else_expr: &Spanned<Expr>,
        scope: &mut Scope,
        span: Span,
    ) -> Result<Lowered, CompileError> {
        let c = self.lower_expr(cond, scope)?;
        let (c, c_ty) = self.rvalue(c, cond.span)?;
        if !c_ty.is_scalar() {
            return Err(CompileError::InvalidOperand {
                op: "?:".to_string(),
                ty: c_ty.to_string(),
                span: cond.span,
            });
        }
        if let Some(lit) = c.as_const() {
            let taken = if lit.is_truthy() { then_expr } else { else_expr };
            return self.lower_expr(taken, scope);
        }

        let (mut then_body, (a, a_ty)) = self.in_block(|this| {
            let v = this.lower_expr(then_expr, scope)?;
            this.rvalue(v, then_expr.span)
        })?;
        let (mut else_body, (b, b_ty)) = self.in_block(|this| {
            let v = this.lower_expr(else_expr, scope)?;
            this.rvalue(v, else_expr.span)
        })?;
        let ty = broadcast(&a_ty, &b_ty).map_err(|e| CompileError::from_type(e, span))?;

        let slot = self.emit(StmtKind::Alloca {
            ty: ty.clone(),
            hint: sanitize_hint("select"),
        });
        for (body, value, value_ty) in [(&mut then_body, a, &a_ty), (&mut else_body, b, &b_ty)] {
            self.blocks.push(std::mem::take(body));
            let value = self.coerce(value, value_ty, &ty, span)?;
            self.emit(StmtKind::LocalStore {
                slot,
                indices: Vec::new(),
                value,
            });
            *body = self.close_block();
        }
        self.emit(StmtKind::If {
            cond: c,
            then_body,
            else_body,
        });
        let out = self.emit_value(StmtKind::LocalLoad {
            slot,
            indices: Vec::new(),
            ty: ty.clone(),
        });
        Ok(Lowered::Value(out, ty))
    }

    /// Lower an expression that must be known at compile time.
    pub(crate) fn lower_static(&mut self, expr: &Spanned<Expr>, scope: &mut Scope, what: &str) -> Result<Value, CompileError> {
        let lowered = self.lower_expr(expr, scope)?;
        Self::static_value(&lowered).ok_or_else(|| CompileError::NotConstant {
            what: what.to_string(),
            span: expr.span,
        })
    }

    pub(crate) fn lower_int_const(&mut self, expr: &Spanned<Expr>, scope: &mut Scope, what: &str) -> Result<i64, CompileError> {
        match self.lower_static(expr, scope, what)? {
            Value::Number(lit) => lit.as_i64().ok_or_else(|| CompileError::NotConstant {
                what: what.to_string(),
                span: expr.span,
            }),
            _ => Err(CompileError::NotConstant {
                what: what.to_string(),
                span: expr.span,
            }),
        }
    }
}

/// Constant indexing into a number array.
fn static_index(values: &[Literal], ty: &Type, indices: &[i64]) -> Option<Value> {
    let idx = |i: i64, n: u8| usize::try_from(i).ok().filter(|i| *i < n as usize);
    match (ty, indices) {
        (Type::Vector(_, n), [i]) => Some(Value::Number(values[idx(*i, *n)?])),
        (Type::Matrix(p, n, m), [r]) => {
            let r = idx(*r, *n)?;
            let row = values[r * *m as usize..(r + 1) * *m as usize].to_vec();
            Some(Value::NumberArray {
                values: row,
                ty: Type::Vector(*p, *m),
            })
        }
        (Type::Matrix(_, n, m), [r, c]) => {
            let (r, c) = (idx(*r, *n)?, idx(*c, *m)?);
            Some(Value::Number(values[r * *m as usize + c]))
        }
        _ => None,
    }
}

/// A constant vector or matrix from constant elements.
fn static_array(items: &[Value]) -> Result<Option<Value>, crate::types::TypeError> {
    if items.is_empty() {
        return Ok(None);
    }
    if items.iter().all(|v| matches!(v, Value::Number(_))) {
        let lits: Vec<Literal> = items
            .iter()
            .filter_map(|v| match v {
                Value::Number(l) => Some(*l),
                _ => None,
            })
            .collect();
        let prim = lits.iter().map(|l| l.prim()).reduce(Prim::promote).unwrap_or(Prim::F32);
        let ty = Type::vector(prim, lits.len())?;
        return Ok(Some(Value::NumberArray {
            values: lits.into_iter().map(|l| l.cast(prim)).collect(),
            ty,
        }));
    }
    let mut cols: Option<u8> = None;
    let mut values = Vec::new();
    for item in items {
        let Value::NumberArray {
            values: row,
            ty: Type::Vector(_, n),
        } = item
        else {
            return Ok(None);
        };
        if *cols.get_or_insert(*n) != *n {
            return Ok(None);
        }
        values.extend(row.iter().map(|l| l.cast(Prim::F32)));
    }
    let ty = Type::matrix(items.len(), cols.unwrap_or(0) as usize)?;
    Ok(Some(Value::NumberArray { values, ty }))
}
