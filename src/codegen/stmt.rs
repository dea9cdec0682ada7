use crate::ir::{AtomicKind, AtomicTarget, LoopControl, Operand, Stmt, StmtId, StmtKind, TextureOpKind};
use crate::library::IntrinsicKind;
use crate::reflect::ResourceKind;
use crate::scope::TextureId;
use crate::types::{Prim, Type, I32};

use super::expr::{compose, decode, encode, matrix_row, Addr, Word};
use super::{Helper, Slot, TaskEmitter};

/// How a local slot (or part of one) is reached.
enum LocalAccess {
    /// An assignable WGSL expression.
    Expr(String),
    /// Row `r` of a matrix variable.
    Row {
        name: String,
        prim: Prim,
        cols: usize,
        r: String,
    },
    /// Words of the temporaries buffer.
    Words(Addr),
}

fn var_name(id: StmtId, hint: &str) -> String {
    if hint.is_empty() {
        format!("_{}", id.0)
    } else {
        format!("_{}_{}", id.0, hint)
    }
}

/// `old op value` for a read-modify-write.
fn combine(op: AtomicKind, old: &str, value: &str) -> String {
    match op {
        AtomicKind::Add => format!("({} + {})", old, value),
        AtomicKind::Sub => format!("({} - {})", old, value),
        AtomicKind::Min => format!("min({}, {})", old, value),
        AtomicKind::Max => format!("max({}, {})", old, value),
        AtomicKind::And => format!("({} & {})", old, value),
        AtomicKind::Or => format!("({} | {})", old, value),
        AtomicKind::Xor => format!("({} ^ {})", old, value),
    }
}

impl<'a> TaskEmitter<'a> {
    pub(crate) fn emit_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.emit_stmt(stmt);
        }
    }

    fn bind_value(&mut self, id: StmtId, ty: &Type, expr: String) {
        let name = format!("_{}", id.0);
        self.line(format!("let {}: {} = {};", name, ty.wgsl(), expr));
        self.names.insert(id, name);
        self.types.insert(id, ty.clone());
    }

    pub(crate) fn declare_var(&mut self, id: StmtId, hint: &str, ty: Type) -> String {
        let name = var_name(id, hint);
        self.names.insert(id, name.clone());
        self.types.insert(id, ty);
        name
    }

    fn emit_nested(&mut self, header: String, body: &[Stmt]) {
        self.line(header);
        self.indent += 1;
        self.emit_block(body);
        self.indent -= 1;
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        let id = stmt.id;
        match &stmt.kind {
            StmtKind::Alloca { ty, hint } => {
                if !self.slots.contains_key(&id) {
                    let name = var_name(id, hint);
                    self.line(format!("var {}: {};", name, ty.wgsl()));
                    self.slots.insert(
                        id,
                        Slot::Var {
                            name,
                            ty: ty.clone(),
                        },
                    );
                }
            }
            StmtKind::LocalLoad { slot, indices, ty } => {
                let access = self.local_access(*slot, indices);
                let expr = self.read_local(&access, ty);
                self.bind_value(id, ty, expr);
            }
            StmtKind::LocalStore {
                slot,
                indices,
                value,
            } => {
                let access = self.local_access(*slot, indices);
                let ty = self.operand_type(value);
                let value = self.operand(value);
                for line in self.write_local(&access, &ty, &value) {
                    self.line(line);
                }
            }
            StmtKind::GlobalPtr {
                field,
                indices,
                offset,
            } => {
                let (strides, comps) = match self.ir.field(*field) {
                    Some(info) => (info.strides(), info.elem.component_count() as i64),
                    None => (vec![1; indices.len()], 1),
                };
                let mut addr = Addr::constant(0);
                for (index, stride) in indices.iter().zip(strides) {
                    let render = self.operand(index);
                    addr.add(index, stride as i64 * comps, &render);
                }
                let render = self.operand(offset);
                addr.add(offset, 1, &render);
                let addr = match addr.dynamic() {
                    Some(dynamic) => {
                        let name = format!("_{}", id.0);
                        self.line(format!("let {}: i32 = {};", name, dynamic));
                        Addr::with_base(name, addr.offset())
                    }
                    None => addr,
                };
                self.types.insert(id, I32);
                self.ptrs.insert(id, (*field, addr));
            }
            StmtKind::GlobalLoad { ptr, ty } => {
                let expr = match self.field_word(*ptr) {
                    Some((var, addr, atomic)) => self.read_words(ty, |k| Word {
                        target: format!("{}[{}]", var, addr.word(k)),
                        atomic,
                    }),
                    None => super::expr::zero(ty),
                };
                self.bind_value(id, ty, expr);
            }
            StmtKind::GlobalStore { ptr, value } => {
                if let Some((var, addr, atomic)) = self.field_word(*ptr) {
                    let ty = self.operand_type(value);
                    let value = self.operand(value);
                    let lines = self.write_words(&ty, &value, |k| Word {
                        target: format!("{}[{}]", var, addr.word(k)),
                        atomic,
                    });
                    for line in lines {
                        self.line(line);
                    }
                }
            }
            StmtKind::BinaryOp {
                op,
                lhs,
                rhs,
                operand_ty,
                ty,
            } => {
                let expr = self.binary_expr(*op, lhs, rhs, operand_ty, ty);
                self.bind_value(id, ty, expr);
            }
            StmtKind::UnaryOp { op, operand, ty } => {
                let expr = self.unary_expr(*op, operand, ty);
                self.bind_value(id, ty, expr);
            }
            StmtKind::Compose { parts, ty } => {
                let parts: Vec<String> = parts.iter().map(|p| self.operand(p)).collect();
                self.bind_value(id, ty, compose(ty, &parts));
            }
            StmtKind::Extract { value, indices, ty } => {
                let value_ty = self.operand_type(value);
                let v = self.operand(value);
                let idx: Vec<String> = indices.iter().map(|i| self.index(i)).collect();
                let expr = match (&value_ty, idx.as_slice()) {
                    (Type::Vector(..), [i]) => format!("{}[{}]", v, i),
                    (Type::Matrix(p, _, m), [r]) => matrix_row(&v, *p, usize::from(*m), r),
                    (Type::Matrix(..), [r, c]) => format!("{}[{}][{}]", v, c, r),
                    _ => v,
                };
                self.bind_value(id, ty, expr);
            }
            StmtKind::RangeFor {
                begin,
                end,
                body,
                hint,
            } => {
                let name = self.declare_var(id, hint, I32);
                let begin = self.operand(begin);
                let end = self.operand(end);
                self.emit_nested(
                    format!(
                        "for (var {name}: i32 = {begin}; {name} < {end}; {name} = {name} + 1i) {{"
                    ),
                    body,
                );
                self.line("}".to_string());
            }
            StmtKind::While {
                cond_body,
                cond,
                body,
            } => {
                self.emit_nested("loop {".to_string(), cond_body);
                self.indent += 1;
                let test = self.condition(cond);
                self.line(format!("if (!({})) {{ break; }}", test));
                self.emit_block(body);
                self.indent -= 1;
                self.line("}".to_string());
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let test = self.condition(cond);
                self.emit_nested(format!("if ({}) {{", test), then_body);
                if !else_body.is_empty() {
                    self.emit_nested("} else {".to_string(), else_body);
                }
                self.line("}".to_string());
            }
            StmtKind::LoopControl(LoopControl::Break) => self.line("break;".to_string()),
            StmtKind::LoopControl(LoopControl::Continue) => self.line("continue;".to_string()),
            StmtKind::AtomicOp {
                target,
                op,
                value,
                ty,
            } => self.emit_atomic(id, target, *op, value, ty),
            StmtKind::Call {
                intrinsic, args, ty, ..
            } => {
                let args: Vec<String> = args.iter().map(|a| self.operand(a)).collect();
                let call = intrinsic.render(&args);
                let expr = match intrinsic.kind {
                    IntrinsicKind::Sign => format!("{}({})", ty.wgsl(), call),
                    _ => call,
                };
                self.bind_value(id, ty, expr);
            }
            StmtKind::TextureOp {
                texture,
                op,
                coords,
                value,
                ty,
            } => self.emit_texture_op(id, *texture, *op, coords, value.as_ref(), ty),
            StmtKind::Return { value, ty } => {
                let rets = self.resource(ResourceKind::Rets);
                let value = self.operand(value);
                let lines = self.write_words(ty, &value, |k| Word {
                    target: format!("{}[{}]", rets, k),
                    atomic: false,
                });
                for line in lines {
                    self.line(line);
                }
            }
            StmtKind::Random { ty } => {
                self.helpers.insert(Helper::Random);
                self.bind_value(id, ty, "rng_next()".to_string());
            }
            StmtKind::ArgLoad { index, ty } => {
                let args = self.resource(ResourceKind::Args);
                let prim = ty.prim().unwrap_or(Prim::I32);
                let expr = decode(&format!("{}[{}]", args, index), prim);
                self.bind_value(id, ty, expr);
            }
        }
    }

    // ─── Places ───────────────────────────────────────────────────

    /// Binding variable, address and atomicity of the field word behind `ptr`.
    /// Lowering emits every `GlobalPtr` ahead of the accesses through it, so a
    /// miss is an IR bug. Release builds fall back to a zero load and skip the
    /// store or atomic.
    fn field_word(&mut self, ptr: StmtId) -> Option<(String, Addr, bool)> {
        let entry = self.ptrs.get(&ptr).cloned();
        debug_assert!(entry.is_some(), "field access through unregistered pointer _{}", ptr.0);
        let (field, addr) = entry?;
        let var = self.resource(ResourceKind::Field(field));
        Some((var, addr, self.atomic_fields.contains(&field)))
    }

    fn local_access(&self, slot: StmtId, indices: &[Operand]) -> LocalAccess {
        let idx: Vec<String> = indices.iter().map(|i| self.index(i)).collect();
        match self.slots.get(&slot) {
            Some(Slot::Tmp { offset, ty }) => {
                let mut addr = Addr::constant(*offset as i64);
                let cols = match ty {
                    Type::Matrix(_, _, m) => *m as i64,
                    _ => 1,
                };
                for (k, (index, render)) in indices.iter().zip(&idx).enumerate() {
                    let scale = if k == 0 { cols } else { 1 };
                    addr.add(index, scale, render);
                }
                LocalAccess::Words(addr)
            }
            Some(Slot::Var { name, ty }) => match (ty, idx.as_slice()) {
                (Type::Matrix(p, _, m), [r]) => LocalAccess::Row {
                    name: name.clone(),
                    prim: *p,
                    cols: usize::from(*m),
                    r: r.clone(),
                },
                (Type::Matrix(..), [r, c]) => LocalAccess::Expr(format!("{}[{}][{}]", name, c, r)),
                (_, [i]) => LocalAccess::Expr(format!("{}[{}]", name, i)),
                _ => LocalAccess::Expr(name.clone()),
            },
            None => LocalAccess::Expr(var_name(slot, "")),
        }
    }

    fn tmp_word(&mut self, addr: &Addr) -> impl Fn(u32) -> Word {
        let tmps = self.resource(ResourceKind::GlobalTmps);
        let addr = addr.clone();
        move |k| Word {
            target: format!("{}[{}]", tmps, addr.word(k)),
            atomic: true,
        }
    }

    fn read_local(&mut self, access: &LocalAccess, ty: &Type) -> String {
        match access {
            LocalAccess::Expr(expr) => expr.clone(),
            LocalAccess::Row {
                name,
                prim,
                cols,
                r,
            } => matrix_row(name, *prim, *cols, r),
            LocalAccess::Words(addr) => {
                let word = self.tmp_word(addr);
                self.read_words(ty, word)
            }
        }
    }

    fn write_local(&mut self, access: &LocalAccess, ty: &Type, value: &str) -> Vec<String> {
        match access {
            LocalAccess::Expr(expr) => vec![format!("{} = {};", expr, value)],
            LocalAccess::Row { name, cols, r, .. } => (0..*cols)
                .map(|c| match ty {
                    Type::Vector(..) => format!("{}[{}][{}] = {}[{}];", name, c, r, value, c),
                    _ => format!("{}[{}][{}] = {};", name, c, r, value),
                })
                .collect(),
            LocalAccess::Words(addr) => {
                let word = self.tmp_word(addr);
                self.write_words(ty, value, word)
            }
        }
    }

    // ─── Atomics and textures ─────────────────────────────────────

    fn emit_atomic(&mut self, id: StmtId, target: &AtomicTarget, op: AtomicKind, value: &Operand, ty: &Type) {
        let prim = ty.prim().unwrap_or(Prim::I32);
        let v = self.operand(value);

        let word = match target {
            AtomicTarget::Global { ptr, .. } => self
                .field_word(*ptr)
                .map(|(var, addr, atomic)| Word {
                    target: format!("{}[{}]", var, addr.word(0)),
                    atomic,
                }),
            AtomicTarget::Local { slot, indices } => match self.local_access(*slot, indices) {
                LocalAccess::Words(addr) => Some(self.tmp_word(&addr)(0)),
                access => {
                    // Slots are private to the invocation: a plain read-modify-write.
                    let old = self.read_local(&access, ty);
                    self.bind_value(id, ty, old);
                    let new = combine(op, &format!("_{}", id.0), &v);
                    for line in self.write_local(&access, ty, &new) {
                        self.line(line);
                    }
                    return;
                }
            },
        };
        let Some(word) = word else {
            // Unregistered pointer, already asserted in `field_word`.
            return;
        };

        if !word.atomic {
            self.bind_value(id, ty, decode(&word.target, prim));
            let new = combine(op, &format!("_{}", id.0), &v);
            self.line(word.store(&encode(&new, prim)));
            return;
        }

        let native = match prim {
            Prim::I32 => true,
            Prim::U32 => !matches!(op, AtomicKind::Min | AtomicKind::Max),
            Prim::F32 => false,
        };
        if native {
            let call = format!(
                "{}(&{}, {})",
                op.wgsl_builtin(),
                word.target,
                encode(&v, prim)
            );
            self.bind_value(id, ty, decode(&call, prim));
            return;
        }

        // Compare-exchange loop on the raw word.
        let old = format!("_{}_old", id.0);
        let new = format!("_{}_new", id.0);
        let res = format!("_{}_res", id.0);
        self.line(format!("var {}: i32 = {};", old, word.load()));
        self.line("loop {".to_string());
        self.indent += 1;
        let updated = combine(op, &decode(&old, prim), &v);
        self.line(format!("let {}: i32 = {};", new, encode(&updated, prim)));
        self.line(format!(
            "let {} = atomicCompareExchangeWeak(&{}, {}, {});",
            res, word.target, old, new
        ));
        self.line(format!("if ({}.exchanged) {{ break; }}", res));
        self.line(format!("{} = {}.old_value;", old, res));
        self.indent -= 1;
        self.line("}".to_string());
        self.bind_value(id, ty, decode(&old, prim));
    }

    fn emit_texture_op(
        &mut self,
        id: StmtId,
        texture: TextureId,
        op: TextureOpKind,
        coords: &Operand,
        value: Option<&Operand>,
        ty: &Type,
    ) {
        let coords = self.operand(coords);
        match op {
            TextureOpKind::Load => {
                let tex = self.resource(ResourceKind::Texture(texture));
                self.bind_value(id, ty, format!("textureLoad({}, {}, 0)", tex, coords));
            }
            TextureOpKind::Sample => {
                let tex = self.resource(ResourceKind::Texture(texture));
                let sampler = self.resource(ResourceKind::Sampler(texture));
                self.bind_value(
                    id,
                    ty,
                    format!("textureSampleLevel({}, {}, {}, 0.0)", tex, sampler, coords),
                );
            }
            TextureOpKind::Store => {
                let tex = self.resource(ResourceKind::StorageTexture(texture));
                let value = value.map(|v| self.operand(v)).unwrap_or_else(|| compose(ty, &[]));
                self.line(format!("textureStore({}, {}, {});", tex, coords, value));
            }
        }
    }
}
