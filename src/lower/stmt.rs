use std::sync::Arc;

use crate::error::CompileError;
use crate::ir::{
    AtomicKind, Literal, LoopControl, Operand, ParallelLoop, Stmt, StmtKind, Task, TaskKind,
};
use crate::scope::{FunctionSource, Record, Scope, Value};
use crate::syntax::ast::{AssignOp, BinOp, DeclKind, Expr, ForBinding, Stmt as AstStmt};
use crate::syntax::span::{Span, Spanned};
use crate::types::{Prim, Type, I32};

use super::helpers::sanitize_hint;
use super::{Lowered, Lowerer, LoopKind};

/// The iteration space of a `for ... of` loop.
pub(crate) struct RangeSpec<'e> {
    /// Wrapped in `ti.static(...)`: unrolled at compile time.
    pub(crate) is_static: bool,
    pub(crate) kind: RangeKind<'e>,
    pub(crate) span: Span,
}

pub(crate) enum RangeKind<'e> {
    /// `range(end)` or `range(begin, end)`.
    Range(&'e [Spanned<Expr>]),
    /// `ndrange(d0, d1, ...)`, iterated row-major.
    NdRange(&'e [Spanned<Expr>]),
}

fn callee_path(expr: &Expr) -> Option<(String, &[Spanned<Expr>])> {
    match expr {
        Expr::Call { callee, args } => Some((callee.node.dotted_path()?, args.as_slice())),
        _ => None,
    }
}

fn binding_hint(binding: &ForBinding) -> String {
    match binding {
        ForBinding::Name(name) => name.node.clone(),
        ForBinding::Destructure(names) => names
            .iter()
            .map(|n| n.node.as_str())
            .collect::<Vec<_>>()
            .join("_"),
    }
}

impl<'a> Lowerer<'a> {
    pub(crate) fn lower_stmt(&mut self, stmt: &Spanned<AstStmt>, scope: &mut Scope) -> Result<(), CompileError> {
        let span = stmt.span;
        match &stmt.node {
            AstStmt::Let { kind, name, init } => {
                let Some(init) = init else {
                    return Err(CompileError::InvalidAssignment {
                        what: format!("`{}` declared without an initializer", name.node),
                        span,
                    });
                };
                let lowered = self.lower_expr(init, scope)?;
                let value = self.bind_let(*kind, &name.node, lowered, init.span)?;
                scope.add_stored(name.node.as_str(), value);
            }
            AstStmt::Function(decl) => {
                let Some(name) = &decl.name else {
                    return Err(CompileError::UnsupportedSyntax {
                        what: "anonymous function declaration".to_string(),
                        span,
                    });
                };
                scope.add_stored(
                    name.node.as_str(),
                    Value::Function(Arc::new(FunctionSource {
                        name: name.node.clone(),
                        decl: decl.clone(),
                    })),
                );
            }
            AstStmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.condition(cond, scope)?;
                if let Some(lit) = c.as_const() {
                    let taken = if lit.is_truthy() {
                        Some(then_branch.as_ref())
                    } else {
                        else_branch.as_deref()
                    };
                    if let Some(taken) = taken {
                        self.lower_stmt(taken, &mut scope.clone())?;
                    }
                    return Ok(());
                }
                let (then_body, ()) = self.in_block(|this| this.lower_stmt(then_branch, &mut scope.clone()))?;
                let (else_body, ()) = self.in_block(|this| match else_branch {
                    Some(branch) => this.lower_stmt(branch, &mut scope.clone()),
                    None => Ok(()),
                })?;
                self.emit(StmtKind::If {
                    cond: c,
                    then_body,
                    else_body,
                });
            }
            AstStmt::For {
                binding,
                iter,
                body,
            } => {
                let range = self.analyze_range(iter)?;
                if range.is_static {
                    self.unroll(binding, &range, body, scope, span, false)?;
                } else {
                    self.lower_serial_for(binding, range, body, scope)?;
                }
            }
            AstStmt::While { cond, body } => {
                let (cond_body, c) = self.in_block(|this| this.condition(cond, scope))?;
                if c.as_const().is_some_and(|lit| !lit.is_truthy()) {
                    return Ok(());
                }
                let (body, ()) = self.in_block(|this| {
                    this.in_loop(LoopKind::Serial, |this| this.lower_stmt(body, &mut scope.clone()))
                })?;
                self.emit(StmtKind::While {
                    cond_body,
                    cond: c,
                    body,
                });
            }
            AstStmt::Break => self.loop_control(LoopControl::Break, span)?,
            AstStmt::Continue => self.loop_control(LoopControl::Continue, span)?,
            AstStmt::Return(_) => {
                return Err(CompileError::InvalidControlFlow {
                    message: "`return` is only allowed as the last statement of a kernel or function"
                        .to_string(),
                    span,
                })
            }
            AstStmt::Block(block) => {
                let mut inner = scope.clone();
                for stmt in &block.stmts {
                    self.lower_stmt(stmt, &mut inner)?;
                }
            }
            AstStmt::Assign { op, place, value } => self.lower_assign(*op, place, value, scope, span)?,
            AstStmt::Expr(expr) => {
                self.lower_expr(expr, scope)?;
            }
            AstStmt::Empty => {}
        }
        Ok(())
    }

    /// A scalar condition operand.
    fn condition(&mut self, cond: &Spanned<Expr>, scope: &mut Scope) -> Result<Operand, CompileError> {
        let c = self.lower_expr(cond, scope)?;
        let (c, ty) = self.rvalue(c, cond.span)?;
        if !ty.is_scalar() {
            return Err(CompileError::InvalidOperand {
                op: "condition".to_string(),
                ty: ty.to_string(),
                span: cond.span,
            });
        }
        Ok(c)
    }

    fn loop_control(&mut self, control: LoopControl, span: Span) -> Result<(), CompileError> {
        let word = match control {
            LoopControl::Break => "break",
            LoopControl::Continue => "continue",
        };
        let message = match (self.loops.last().copied(), control) {
            (Some(LoopKind::Serial), _) | (Some(LoopKind::Parallel), LoopControl::Continue) => {
                self.emit(StmtKind::LoopControl(control));
                return Ok(());
            }
            (Some(LoopKind::Parallel), LoopControl::Break) => {
                "`break` cannot leave a parallel loop".to_string()
            }
            (Some(LoopKind::Static), _) => format!("`{}` inside a static loop", word),
            (Some(LoopKind::Function), _) | (None, _) => format!("`{}` outside of a loop", word),
        };
        Err(CompileError::InvalidControlFlow { message, span })
    }

    // ─── Bindings ─────────────────────────────────────────────────

    fn bind_let(&mut self, kind: DeclKind, name: &str, lowered: Lowered, span: Span) -> Result<Value, CompileError> {
        match lowered {
            Lowered::Static(
                v @ (Value::Field(_) | Value::Texture(_) | Value::Function(_) | Value::Record(_)),
            ) => Ok(v),
            Lowered::Static(v) if kind == DeclKind::Const => Ok(v),
            Lowered::Record(entries) => self.copy_record(name, entries, span),
            Lowered::Place(place) if place.ty().is_struct() => match self.load_record(&place) {
                Some(Lowered::Record(entries)) => self.copy_record(name, entries, span),
                _ => Err(CompileError::UnsupportedSyntax {
                    what: "struct copy".to_string(),
                    span,
                }),
            },
            Lowered::Void => Err(CompileError::InvalidAssignment {
                what: format!("`{}` from an expression without a value", name),
                span,
            }),
            other => Ok(Value::Place(self.alloc_slot(other, name, span)?)),
        }
    }

    /// Give every member of a struct value its own slot.
    fn copy_record(&mut self, name: &str, entries: Vec<(String, Lowered)>, span: Span) -> Result<Value, CompileError> {
        let mut members = Vec::new();
        for (key, entry) in entries {
            let hint = format!("{}_{}", name, key);
            let value = self.bind_let(DeclKind::Let, &hint, entry, span)?;
            members.push((key, value));
        }
        Ok(Value::Record(Arc::new(Record::new(members))))
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        place: &Spanned<Expr>,
        value: &Spanned<Expr>,
        scope: &mut Scope,
        span: Span,
    ) -> Result<(), CompileError> {
        let target = match self.lower_expr(place, scope)? {
            Lowered::Place(p) => p,
            other => {
                return Err(CompileError::InvalidAssignment {
                    what: format!("a {}", other.kind_name()),
                    span: place.span,
                })
            }
        };
        let rhs = self.lower_expr(value, scope)?;
        let Some(bin) = op.binary() else {
            return self.store(&target, rhs, span);
        };
        let atomic = match op {
            AssignOp::Add => Some(AtomicKind::Add),
            AssignOp::Sub => Some(AtomicKind::Sub),
            AssignOp::BitAnd => Some(AtomicKind::And),
            AssignOp::BitOr => Some(AtomicKind::Or),
            AssignOp::BitXor => Some(AtomicKind::Xor),
            _ => None,
        };
        if let (Some(kind), true) = (atomic, target.ty().is_scalar()) {
            self.atomic(&target, kind, rhs, span)?;
            return Ok(());
        }
        let current = self.load(&target, place.span)?;
        let rhs = self.rvalue(rhs, value.span)?;
        let (result, ty) = self.binary(bin, current, rhs, span)?;
        self.store(&target, Lowered::Value(result, ty), span)
    }

    // ─── Loops ────────────────────────────────────────────────────

    pub(crate) fn analyze_range<'e>(
        &self,
        iter: &'e Spanned<Expr>,
    ) -> Result<RangeSpec<'e>, CompileError> {
        let unsupported = || CompileError::UnsupportedSyntax {
            what: format!("for-of over a {}; expected range() or ndrange()", iter.node.kind_name()),
            span: iter.span,
        };
        let (mut path, mut args) = callee_path(&iter.node).ok_or_else(unsupported)?;
        let mut is_static = false;
        if matches!(path.as_str(), "static" | "ti.static") && args.len() == 1 {
            is_static = true;
            (path, args) = callee_path(&args[0].node).ok_or_else(unsupported)?;
        }
        let kind = match path.as_str() {
            "range" | "ti.range" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(CompileError::ArityMismatch {
                        name: "range".to_string(),
                        expected: 2,
                        found: args.len(),
                        span: iter.span,
                    });
                }
                RangeKind::Range(args)
            }
            "ndrange" | "ti.ndrange" => {
                if args.is_empty() || args.len() > 4 {
                    return Err(CompileError::ArityMismatch {
                        name: "ndrange".to_string(),
                        expected: args.len().clamp(1, 4),
                        found: args.len(),
                        span: iter.span,
                    });
                }
                RangeKind::NdRange(args)
            }
            _ => return Err(unsupported()),
        };
        Ok(RangeSpec {
            is_static,
            kind,
            span: iter.span,
        })
    }

    /// Unroll a static loop, binding the index as a constant each time.
    pub(crate) fn unroll(
        &mut self,
        binding: &ForBinding,
        range: &RangeSpec<'_>,
        body: &Spanned<AstStmt>,
        scope: &mut Scope,
        span: Span,
        top: bool,
    ) -> Result<(), CompileError> {
        let what = "static loop bound";
        let dims: Vec<(i64, i64)> = match range.kind {
            RangeKind::Range([end]) => vec![(0, self.lower_int_const(end, scope, what)?)],
            RangeKind::Range([begin, end]) => vec![(
                self.lower_int_const(begin, scope, what)?,
                self.lower_int_const(end, scope, what)?,
            )],
            RangeKind::Range(_) => Vec::new(),
            RangeKind::NdRange(args) => {
                let mut dims = Vec::new();
                for arg in args {
                    dims.push((0, self.lower_int_const(arg, scope, what)?));
                }
                dims
            }
        };
        let count: u64 = dims
            .iter()
            .map(|(b, e)| (e - b).max(0) as u64)
            .fold(1u64, |acc, n| acc.saturating_mul(n));
        if count > self.config.unroll_limit as u64 {
            return Err(CompileError::UnrollLimitExceeded {
                count,
                limit: self.config.unroll_limit,
                span,
            });
        }

        let mut index = vec![0i64; dims.len()];
        for mut flat in 0..count {
            for (k, (begin, end)) in dims.iter().enumerate().rev() {
                let extent = (end - begin).max(1) as u64;
                index[k] = begin + (flat % extent) as i64;
                flat /= extent;
            }
            let parts: Vec<Operand> = index
                .iter()
                .map(|i| Operand::Const(Literal::I32(*i as i32)))
                .collect();
            let mut inner = scope.clone();
            self.bind_loop_vars(binding, parts, &mut inner, range.span)?;
            self.in_loop(LoopKind::Static, |this| match (&body.node, top) {
                (AstStmt::Block(block), true) => this.lower_top_block(&block.stmts, &mut inner, false),
                (_, true) => this.lower_top_block(std::slice::from_ref(body), &mut inner, false),
                (_, false) => this.lower_stmt(body, &mut inner),
            })?;
        }
        Ok(())
    }

    /// Bind loop variables to index components.
    fn bind_loop_vars(
        &mut self,
        binding: &ForBinding,
        parts: Vec<Operand>,
        scope: &mut Scope,
        span: Span,
    ) -> Result<(), CompileError> {
        fn scalar(op: Operand) -> Value {
            match op {
                Operand::Const(lit) => Value::Number(lit),
                op => Value::Bound(op, I32),
            }
        }
        match binding {
            ForBinding::Name(name) => {
                let value = if parts.len() == 1 {
                    scalar(parts[0])
                } else if let Some(values) = parts.iter().map(|p| p.as_const()).collect::<Option<Vec<_>>>() {
                    Value::NumberArray {
                        values,
                        ty: Type::vector(Prim::I32, parts.len()).map_err(|e| CompileError::from_type(e, span))?,
                    }
                } else {
                    let ty = Type::vector(Prim::I32, parts.len()).map_err(|e| CompileError::from_type(e, span))?;
                    let op = self.emit_value(StmtKind::Compose {
                        parts,
                        ty: ty.clone(),
                    });
                    Value::Bound(op, ty)
                };
                scope.add_stored(name.node.as_str(), value);
            }
            ForBinding::Destructure(names) => {
                if names.len() != parts.len() {
                    return Err(CompileError::ArityMismatch {
                        name: "loop index".to_string(),
                        expected: parts.len(),
                        found: names.len(),
                        span,
                    });
                }
                for (name, part) in names.iter().zip(parts) {
                    scope.add_stored(name.node.as_str(), scalar(part));
                }
            }
        }
        Ok(())
    }

    /// Bounds of a dynamic loop: begin, end and the ndrange extents.
    fn loop_bounds(
        &mut self,
        range: &RangeSpec<'_>,
        scope: &mut Scope,
    ) -> Result<(Operand, Operand, Vec<Operand>), CompileError> {
        let zero = Operand::Const(Literal::I32(0));
        match range.kind {
            RangeKind::Range(args) => {
                let mut ops = Vec::new();
                for arg in args {
                    let lowered = self.lower_expr(arg, scope)?;
                    ops.push(self.int_operand(lowered, arg.span)?);
                }
                match ops.as_slice() {
                    [end] => Ok((zero, *end, Vec::new())),
                    [begin, end] => Ok((*begin, *end, Vec::new())),
                    _ => Ok((zero, zero, Vec::new())),
                }
            }
            RangeKind::NdRange(args) => {
                let mut dims = Vec::new();
                for arg in args {
                    let lowered = self.lower_expr(arg, scope)?;
                    dims.push(self.int_operand(lowered, arg.span)?);
                }
                let mut total = Operand::Const(Literal::I32(1));
                for dim in &dims {
                    total = self.int_binary(BinOp::Mul, total, *dim);
                }
                Ok((zero, total, dims))
            }
        }
    }

    /// Row-major components of a flat ndrange index.
    fn unflatten(&mut self, flat: Operand, dims: &[Operand]) -> Vec<Operand> {
        if dims.is_empty() {
            return vec![flat];
        }
        let mut parts = vec![flat; dims.len()];
        let mut rest = flat;
        for (k, dim) in dims.iter().enumerate().rev() {
            if k == 0 {
                parts[0] = rest;
            } else {
                parts[k] = self.int_binary(BinOp::Mod, rest, *dim);
                rest = self.int_binary(BinOp::FloorDiv, rest, *dim);
            }
        }
        parts
    }

    fn lower_serial_for(
        &mut self,
        binding: &ForBinding,
        range: RangeSpec<'_>,
        body: &Spanned<AstStmt>,
        scope: &mut Scope,
    ) -> Result<(), CompileError> {
        let (begin, end, dims) = self.loop_bounds(&range, scope)?;
        let index = self.fresh_id();
        let (body, ()) = self.in_block(|this| {
            this.in_loop(LoopKind::Serial, |this| {
                let mut inner = scope.clone();
                let parts = this.unflatten(Operand::Stmt(index), &dims);
                this.bind_loop_vars(binding, parts, &mut inner, range.span)?;
                this.lower_stmt(body, &mut inner)
            })
        })?;
        self.push_stmt(Stmt {
            id: index,
            kind: StmtKind::RangeFor {
                begin,
                end,
                body,
                hint: sanitize_hint(&binding_hint(binding)),
            },
        });
        Ok(())
    }

    /// A top-level loop: its own task, iterations spread over threads.
    pub(crate) fn lower_parallel_for(
        &mut self,
        binding: &ForBinding,
        range: RangeSpec<'_>,
        body: &Spanned<AstStmt>,
        scope: &mut Scope,
    ) -> Result<(), CompileError> {
        self.flush_serial();
        let (prologue, (begin, end, dims)) = self.in_block(|this| this.loop_bounds(&range, scope))?;
        let index = self.fresh_id();
        let (body, ()) = self.in_block(|this| {
            this.in_loop(LoopKind::Parallel, |this| {
                let mut inner = scope.clone();
                let parts = this.unflatten(Operand::Stmt(index), &dims);
                this.bind_loop_vars(binding, parts, &mut inner, range.span)?;
                this.lower_stmt(body, &mut inner)
            })
        })?;
        let threads = match (begin.as_const(), end.as_const()) {
            (Some(b), Some(e)) => match (b.as_i64(), e.as_i64()) {
                (Some(b), Some(e)) => Some((e - b).clamp(0, u32::MAX as i64) as u32),
                _ => None,
            },
            _ => None,
        };
        self.tasks.push(Task {
            kind: TaskKind::Parallel(ParallelLoop {
                prologue,
                begin,
                end,
                index,
                hint: sanitize_hint(&binding_hint(binding)),
                threads,
            }),
            body,
        });
        Ok(())
    }

    /// The final top-level `return` of a kernel.
    pub(crate) fn lower_kernel_return(
        &mut self,
        value: Option<&Spanned<Expr>>,
        scope: &mut Scope,
        span: Span,
    ) -> Result<(), CompileError> {
        let Some(value) = value else {
            return Ok(());
        };
        let lowered = self.lower_expr(value, scope)?;
        let (op, ty) = self.rvalue(lowered, span)?;
        self.emit(StmtKind::Return {
            value: op,
            ty: ty.clone(),
        });
        self.ret = Some(ty);
        Ok(())
    }
}
