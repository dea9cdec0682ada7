//! Calls: helper-function inlining and intrinsic lowering.

use std::sync::Arc;

use crate::error::CompileError;
use crate::ir::{Operand, StmtKind, TextureOpKind, UnaryOp};
use crate::library::{self, Intrinsic, IntrinsicKind as K, LIBRARY_FILE};
use crate::scope::{FunctionSource, Record, Scope, Value};
use crate::syntax::ast::{BinOp, Expr, Stmt as AstStmt};
use crate::syntax::parse_function;
use crate::syntax::span::{Span, Spanned};
use crate::types::{Prim, Type, F32};

use super::{Lowered, Lowerer, LoopKind};

type Arg = (Lowered, Span);

fn arity_error(name: &str, expected: usize, found: usize, span: Span) -> CompileError {
    CompileError::ArityMismatch {
        name: name.to_string(),
        expected,
        found,
        span,
    }
}

fn take<const N: usize>(name: &str, args: Vec<Arg>, span: Span) -> Result<[Arg; N], CompileError> {
    let found = args.len();
    args.try_into().map_err(|_| arity_error(name, N, found, span))
}

impl<'a> Lowerer<'a> {
    pub(crate) fn lower_call(
        &mut self,
        callee: &Spanned<Expr>,
        args: &[Spanned<Expr>],
        scope: &mut Scope,
        span: Span,
    ) -> Result<Lowered, CompileError> {
        if let Expr::Arrow(decl) = &callee.node {
            let func = FunctionSource {
                name: "<arrow>".to_string(),
                decl: decl.clone(),
            };
            let args = self.lower_args(args, scope)?;
            return self.inline_call(&func, args, None, scope, span);
        }

        if let Some(path) = callee.node.dotted_path() {
            if let Some(Value::Function(func)) = scope.try_evaluate(&path).cloned() {
                let receiver = path
                    .rsplit_once('.')
                    .and_then(|(owner, _)| scope.try_evaluate(owner).cloned())
                    .filter(|v| matches!(v, Value::Record(_)));
                let args = self.lower_args(args, scope)?;
                return self.inline_call(&func, args, receiver, scope, span);
            }
            if !scope.has_stored(&path) {
                if let Some(func) = self.library_source(&path)? {
                    let args = self.lower_args(args, scope)?;
                    return self.inline_call(&func, args, None, scope, span);
                }
                if let Some(intrinsic) = library::lookup(&path) {
                    let args = self.lower_args(args, scope)?;
                    return self.lower_intrinsic(intrinsic, args, span);
                }
            }
            if matches!(path.as_str(), "range" | "ti.range" | "ndrange" | "ti.ndrange") {
                return Err(CompileError::UnsupportedSyntax {
                    what: format!("`{}()` outside of a for-of loop", path),
                    span,
                });
            }
        }

        // `x.f(y)` is `f(x, y)`.
        if let Expr::Member { base, name } = &callee.node {
            let receiver = self.lower_expr(base, scope)?;
            if let Lowered::Static(Value::Record(record)) = &receiver {
                if let Some(Value::Function(func)) = record.get(&name.node).cloned() {
                    let owner = Value::Record(record.clone());
                    let args = self.lower_args(args, scope)?;
                    return self.inline_call(&func, args, Some(owner), scope, span);
                }
            }
            let receiver_kind = receiver.kind_name();
            let mut all = vec![(receiver, base.span)];
            all.extend(self.lower_args(args, scope)?);

            if let Some(Value::Function(func)) = scope.get_stored(&name.node).cloned() {
                return self.inline_call(&func, all, None, scope, span);
            }
            if let Some(func) = self.library_source(&name.node)? {
                return self.inline_call(&func, all, None, scope, span);
            }
            if let Some(intrinsic) = library::lookup(&name.node) {
                return self.lower_intrinsic(intrinsic, all, span);
            }
            return Err(CompileError::UnknownField {
                name: name.node.clone(),
                ty: receiver_kind.to_string(),
                span: name.span,
            });
        }

        match callee.node.dotted_path() {
            Some(path) => Err(CompileError::UnresolvedSymbol {
                name: path,
                span: callee.span,
            }),
            None => Err(CompileError::UnsupportedSyntax {
                what: format!("calling a {}", callee.node.kind_name()),
                span: callee.span,
            }),
        }
    }

    fn lower_args(&mut self, args: &[Spanned<Expr>], scope: &mut Scope) -> Result<Vec<Arg>, CompileError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push((self.lower_expr(arg, scope)?, arg.span));
        }
        Ok(out)
    }

    /// A built-in helper written in kernel source, parsed on first use.
    fn library_source(&mut self, name: &str) -> Result<Option<Arc<FunctionSource>>, CompileError> {
        let Some(function) = library::library_function(name) else {
            return Ok(None);
        };
        if let Some(parsed) = self.library.get(function.name) {
            return Ok(Some(parsed.clone()));
        }
        let decl = parse_function(function.source, LIBRARY_FILE).map_err(CompileError::Parse)?;
        let parsed = Arc::new(FunctionSource {
            name: function.name.to_string(),
            decl,
        });
        self.library.insert(function.name, parsed.clone());
        Ok(Some(parsed))
    }

    // ─── Inlining ─────────────────────────────────────────────────

    /// Expand a helper function at the call site.
    ///
    /// Arguments that are places are passed by reference, so helpers can
    /// write results through their parameters. Other values are copied
    /// into fresh slots.
    fn inline_call(
        &mut self,
        func: &FunctionSource,
        args: Vec<Arg>,
        receiver: Option<Value>,
        caller: &Scope,
        span: Span,
    ) -> Result<Lowered, CompileError> {
        let decl = &func.decl;
        if args.len() != decl.params.len() {
            return Err(arity_error(&func.name, decl.params.len(), args.len(), span));
        }
        let key = Arc::as_ptr(decl) as usize;
        if self.inline_stack.contains(&key) {
            return Err(CompileError::RecursionDetected {
                name: func.name.clone(),
                span,
            });
        }
        if self.inline_stack.len() >= self.config.max_inline_depth as usize {
            return Err(CompileError::InlineDepthExceeded {
                limit: self.config.max_inline_depth,
                span,
            });
        }

        let mut inner = self.globals.clone();
        for name in caller.names() {
            if let Some(value @ Value::Function(_)) = caller.get_stored(name) {
                inner.add_stored(name, value.clone());
            }
        }
        if let Some(receiver) = receiver {
            inner = inner.with_receiver(receiver);
        }
        for (param, (arg, arg_span)) in decl.params.iter().zip(args) {
            let value = self.bind_argument(&param.name.node, arg, arg_span)?;
            inner.add_stored(param.name.node.as_str(), value);
        }

        self.inline_stack.push(key);
        let result = self.in_loop(LoopKind::Function, |this| this.lower_body(&decl.body.node.stmts, &mut inner));
        self.inline_stack.pop();

        result.map_err(|err| match err.span() {
            Some(at) if at.file_id != span.file_id => err.relocate(span, &func.name),
            _ => err,
        })
    }

    fn bind_argument(&mut self, name: &str, arg: Lowered, span: Span) -> Result<Value, CompileError> {
        match arg {
            Lowered::Place(place) => Ok(Value::Place(place)),
            Lowered::Static(value) => Ok(value),
            Lowered::Record(entries) => {
                let mut members = Vec::new();
                for (key, entry) in entries {
                    members.push((key.clone(), self.bind_argument(&key, entry, span)?));
                }
                Ok(Value::Record(Arc::new(Record::new(members))))
            }
            Lowered::Void => Err(CompileError::InvalidAssignment {
                what: format!("parameter `{}` from an expression without a value", name),
                span,
            }),
            value @ Lowered::Value(..) => Ok(Value::Place(self.alloc_slot(value, name, span)?)),
        }
    }

    /// A helper body; a trailing `return` yields the call's value.
    fn lower_body(&mut self, stmts: &[Spanned<AstStmt>], scope: &mut Scope) -> Result<Lowered, CompileError> {
        let (last, init) = match stmts.split_last() {
            Some((last, init)) if matches!(last.node, AstStmt::Return(_)) => (Some(last), init),
            _ => (None, stmts),
        };
        for stmt in init {
            self.lower_stmt(stmt, scope)?;
        }
        match last.map(|s| &s.node) {
            Some(AstStmt::Return(Some(value))) => self.lower_expr(value, scope),
            _ => Ok(Lowered::Void),
        }
    }

    // ─── Intrinsics ───────────────────────────────────────────────

    fn lower_intrinsic(&mut self, intrinsic: &'static Intrinsic, args: Vec<Arg>, span: Span) -> Result<Lowered, CompileError> {
        let name = intrinsic.name;
        match intrinsic.kind {
            K::TextureStore => {
                let [tex, coords, value] = take::<3>(name, args, span)?;
                return self.lower_texture_op(intrinsic, tex, coords, Some(value));
            }
            K::TextureLoad | K::TextureSample => {
                let [tex, coords] = take::<2>(name, args, span)?;
                return self.lower_texture_op(intrinsic, tex, coords, None);
            }
            _ => {}
        }
        if args.len() != intrinsic.arity {
            return Err(arity_error(name, intrinsic.arity, args.len(), span));
        }

        match intrinsic.kind {
            K::Static => {
                let [(arg, arg_span)] = take::<1>(name, args, span)?;
                Self::static_value(&arg)
                    .map(Lowered::Static)
                    .ok_or_else(|| CompileError::NotConstant {
                        what: "argument of `static()`".to_string(),
                        span: arg_span,
                    })
            }
            K::Atomic(kind) => {
                let [(target, target_span), (value, _)] = take::<2>(name, args, span)?;
                match target {
                    Lowered::Place(place) => {
                        let (old, ty) = self.atomic(&place, kind, value, span)?;
                        Ok(Lowered::Value(old, ty))
                    }
                    other => Err(CompileError::InvalidAssignment {
                        what: format!("a {} with `{}`", other.kind_name(), name),
                        span: target_span,
                    }),
                }
            }
            K::Random => {
                let op = self.emit_value(StmtKind::Random { ty: F32 });
                Ok(Lowered::Value(op, F32))
            }
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for (arg, arg_span) in args {
                    values.push(self.rvalue(arg, arg_span)?);
                }
                self.lower_math(intrinsic, values, span)
            }
        }
    }

    fn lower_math(
        &mut self,
        intrinsic: &'static Intrinsic,
        values: Vec<(Operand, Type)>,
        span: Span,
    ) -> Result<Lowered, CompileError> {
        let invalid = |ty: &Type| CompileError::InvalidOperand {
            op: intrinsic.name.to_string(),
            ty: ty.to_string(),
            span,
        };
        match intrinsic.kind {
            K::Matmul => {
                let (op, ty) = self.binary(BinOp::MatMul, values[0].clone(), values[1].clone(), span)?;
                Ok(Lowered::Value(op, ty))
            }
            K::Sum => {
                let (value, ty) = values[0].clone();
                let elem = ty.component_type();
                let parts = self.components(value, &ty);
                let Some((first, rest)) = parts.split_first() else {
                    return Err(invalid(&ty));
                };
                let mut acc = *first;
                for part in rest {
                    acc = self.binary(BinOp::Add, (acc, elem.clone()), (*part, elem.clone()), span)?.0;
                }
                Ok(Lowered::Value(acc, elem))
            }
            K::OuterProduct => {
                let (a, a_ty) = values[0].clone();
                let (b, b_ty) = values[1].clone();
                let (Type::Vector(_, n), Type::Vector(_, m)) = (&a_ty, &b_ty) else {
                    return Err(invalid(if a_ty.is_vector() { &b_ty } else { &a_ty }));
                };
                let ty = Type::matrix(*n as usize, *m as usize).map_err(|e| CompileError::from_type(e, span))?;
                let a = self.coerce(a, &a_ty, &a_ty.with_prim(Prim::F32), span)?;
                let b = self.coerce(b, &b_ty, &b_ty.with_prim(Prim::F32), span)?;
                let rows = self.components(a, &a_ty.with_prim(Prim::F32));
                let cols = self.components(b, &b_ty.with_prim(Prim::F32));
                let mut parts = Vec::with_capacity(rows.len() * cols.len());
                for r in &rows {
                    for c in &cols {
                        parts.push(self.binary(BinOp::Mul, (*r, F32), (*c, F32), span)?.0);
                    }
                }
                let op = self.emit_value(StmtKind::Compose {
                    parts,
                    ty: ty.clone(),
                });
                Ok(Lowered::Value(op, ty))
            }
            K::Concat => {
                let mut prim: Option<Prim> = None;
                for (_, ty) in &values {
                    if ty.is_matrix() {
                        return Err(invalid(ty));
                    }
                    let p = ty.prim().ok_or_else(|| invalid(ty))?;
                    prim = Some(prim.map_or(p, |q| Prim::promote(q, p)));
                }
                let prim = prim.unwrap_or(Prim::F32);
                let elem = Type::Scalar(prim);
                let mut parts = Vec::new();
                for (value, ty) in values {
                    for part in self.components(value, &ty) {
                        parts.push(self.coerce(part, &ty.component_type(), &elem, span)?);
                    }
                }
                let ty = Type::vector(prim, parts.len()).map_err(|e| CompileError::from_type(e, span))?;
                let op = self.emit_value(StmtKind::Compose {
                    parts,
                    ty: ty.clone(),
                });
                Ok(Lowered::Value(op, ty))
            }
            K::Cast(prim) | K::Bitcast(prim) => {
                let (value, ty) = values[0].clone();
                let sig = intrinsic
                    .signature(std::slice::from_ref(&ty))
                    .map_err(|e| CompileError::from_type(e, span))?;
                if sig.ret == ty {
                    return Ok(Lowered::Value(value, ty));
                }
                let op = match intrinsic.kind {
                    K::Cast(_) => UnaryOp::Cast(prim),
                    _ => UnaryOp::Bitcast(prim),
                };
                let out = self.unary_ir(op, value, sig.ret.clone());
                Ok(Lowered::Value(out, sig.ret))
            }
            _ => {
                let tys: Vec<Type> = values.iter().map(|(_, ty)| ty.clone()).collect();
                let sig = intrinsic
                    .signature(&tys)
                    .map_err(|e| CompileError::from_type(e, span))?;
                let mut args = Vec::with_capacity(values.len());
                for ((value, ty), target) in values.into_iter().zip(&sig.args) {
                    args.push(self.coerce(value, &ty, target, span)?);
                }
                let op = self.emit_value(StmtKind::Call {
                    intrinsic,
                    args,
                    arg_tys: sig.args,
                    ty: sig.ret.clone(),
                });
                Ok(Lowered::Value(op, sig.ret))
            }
        }
    }

    fn lower_texture_op(
        &mut self,
        intrinsic: &'static Intrinsic,
        (texture, texture_span): Arg,
        (coords, coords_span): Arg,
        value: Option<Arg>,
    ) -> Result<Lowered, CompileError> {
        let found = texture.kind_name();
        let Lowered::Static(Value::Texture(texture)) = texture else {
            return Err(CompileError::InvalidOperand {
                op: intrinsic.name.to_string(),
                ty: found.to_string(),
                span: texture_span,
            });
        };
        let (op, coord_prim) = match intrinsic.kind {
            K::TextureStore => (TextureOpKind::Store, Prim::I32),
            K::TextureSample => (TextureOpKind::Sample, Prim::F32),
            _ => (TextureOpKind::Load, Prim::I32),
        };
        let wrong_kind = match op {
            TextureOpKind::Store if !texture.storage => Some("sampled"),
            TextureOpKind::Load | TextureOpKind::Sample if texture.storage => Some("storage"),
            _ => None,
        };
        if let Some(kind) = wrong_kind {
            return Err(CompileError::InvalidOperand {
                op: intrinsic.name.to_string(),
                ty: format!("{} texture `{}`", kind, texture.name),
                span: texture_span,
            });
        }

        let coord_ty = match texture.rank() {
            1 => Type::Scalar(coord_prim),
            n => Type::vector(coord_prim, n).map_err(|e| CompileError::from_type(e, coords_span))?,
        };
        let (c, c_ty) = self.rvalue(coords, coords_span)?;
        let c = self.coerce(c, &c_ty, &coord_ty, coords_span)?;

        let texel = Type::Vector(Prim::F32, 4);
        let value = match value {
            Some((value, value_span)) => {
                let (v, v_ty) = self.rvalue(value, value_span)?;
                Some(self.coerce(v, &v_ty, &texel, value_span)?)
            }
            None => None,
        };
        self.textures
            .entry(texture.id)
            .or_insert_with(|| texture.clone());
        let id = self.emit(StmtKind::TextureOp {
            texture: texture.id,
            op,
            coords: c,
            value,
            ty: texel.clone(),
        });
        if op == TextureOpKind::Store {
            return Ok(Lowered::Void);
        }
        Ok(Lowered::Value(Operand::Stmt(id), texel))
    }
}
