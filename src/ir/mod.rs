//! Kernel IR: typed statements with structural control flow.
//!
//! Lowering produces one `KernelIr` per kernel. Its tasks are compute
//! dispatches run in order; each task body is a tree of `Stmt`s whose
//! value-producing statements are referenced by `StmtId`.

pub mod fold;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::library::Intrinsic;
use crate::scope::{FieldId, FieldInfo, TextureId, TextureInfo};
use crate::syntax::ast::BinOp;
use crate::types::{Prim, Type};

pub use fold::{fold_binary, fold_unary};

// ─── Operands ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A compile-time scalar constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    I32(i32),
    U32(u32),
    F32(f32),
}

impl Literal {
    pub fn prim(self) -> Prim {
        match self {
            Literal::I32(_) => Prim::I32,
            Literal::U32(_) => Prim::U32,
            Literal::F32(_) => Prim::F32,
        }
    }

    pub fn ty(self) -> Type {
        Type::Scalar(self.prim())
    }

    /// Value conversion; float to integer truncates toward zero and saturates.
    pub fn cast(self, prim: Prim) -> Literal {
        match (self, prim) {
            (Literal::I32(v), Prim::I32) => Literal::I32(v),
            (Literal::I32(v), Prim::U32) => Literal::U32(v as u32),
            (Literal::I32(v), Prim::F32) => Literal::F32(v as f32),
            (Literal::U32(v), Prim::I32) => Literal::I32(v as i32),
            (Literal::U32(v), Prim::U32) => Literal::U32(v),
            (Literal::U32(v), Prim::F32) => Literal::F32(v as f32),
            (Literal::F32(v), Prim::I32) => Literal::I32(v as i32),
            (Literal::F32(v), Prim::U32) => Literal::U32(v as u32),
            (Literal::F32(v), Prim::F32) => Literal::F32(v),
        }
    }

    /// Reinterpret the 32-bit pattern as another element type.
    pub fn bitcast(self, prim: Prim) -> Literal {
        let bits = self.to_bits();
        match prim {
            Prim::I32 => Literal::I32(bits as i32),
            Prim::U32 => Literal::U32(bits),
            Prim::F32 => Literal::F32(f32::from_bits(bits)),
        }
    }

    pub fn to_bits(self) -> u32 {
        match self {
            Literal::I32(v) => v as u32,
            Literal::U32(v) => v,
            Literal::F32(v) => v.to_bits(),
        }
    }

    pub fn from_bits(bits: u32, prim: Prim) -> Literal {
        Literal::U32(bits).bitcast(prim)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Literal::I32(v) => v as f64,
            Literal::U32(v) => v as f64,
            Literal::F32(v) => v as f64,
        }
    }

    /// Integer value, if this literal holds a whole number.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Literal::I32(v) => Some(v as i64),
            Literal::U32(v) => Some(v as i64),
            Literal::F32(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            Literal::F32(_) => None,
        }
    }

    pub fn is_truthy(self) -> bool {
        match self {
            Literal::I32(v) => v != 0,
            Literal::U32(v) => v != 0,
            Literal::F32(v) => v != 0.0,
        }
    }

    /// WGSL spelling with an explicit type suffix.
    pub fn wgsl(self) -> String {
        match self {
            Literal::I32(i32::MIN) => "i32(-2147483648)".to_string(),
            Literal::I32(v) => format!("{}i", v),
            Literal::U32(v) => format!("{}u", v),
            Literal::F32(v) if v.is_finite() => {
                let text = format!("{:?}", v);
                if text.contains('.') || text.contains('e') {
                    format!("{}f", text)
                } else {
                    format!("{}.0f", text)
                }
            }
            Literal::F32(v) => format!("bitcast<f32>({}u)", v.to_bits()),
        }
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::I32(v)
    }
}

impl From<u32> for Literal {
    fn from(v: u32) -> Self {
        Literal::U32(v)
    }
}

impl From<f32> for Literal {
    fn from(v: f32) -> Self {
        Literal::F32(v)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::I32(v) => write!(f, "{}i", v),
            Literal::U32(v) => write!(f, "{}u", v),
            Literal::F32(v) => write!(f, "{:?}f", v),
        }
    }
}

/// A statement operand: the value of an earlier statement or a constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    Stmt(StmtId),
    Const(Literal),
}

impl Operand {
    pub fn as_const(&self) -> Option<Literal> {
        match self {
            Operand::Const(lit) => Some(*lit),
            Operand::Stmt(_) => None,
        }
    }
}

impl From<Literal> for Operand {
    fn from(lit: Literal) -> Self {
        Operand::Const(lit)
    }
}

impl From<StmtId> for Operand {
    fn from(id: StmtId) -> Self {
        Operand::Stmt(id)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Stmt(id) => write!(f, "{}", id),
            Operand::Const(lit) => write!(f, "{}", lit),
        }
    }
}

// ─── Statements ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// Logical not: 1 when the operand is zero.
    Not,
    BitNot,
    Cast(Prim),
    Bitcast(Prim),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtomicKind {
    Add,
    Sub,
    Min,
    Max,
    And,
    Or,
    Xor,
}

impl AtomicKind {
    pub fn wgsl_builtin(self) -> &'static str {
        match self {
            AtomicKind::Add => "atomicAdd",
            AtomicKind::Sub => "atomicSub",
            AtomicKind::Min => "atomicMin",
            AtomicKind::Max => "atomicMax",
            AtomicKind::And => "atomicAnd",
            AtomicKind::Or => "atomicOr",
            AtomicKind::Xor => "atomicXor",
        }
    }

    /// The equivalent binary operator for non-atomic read-modify-write.
    pub fn binary(self) -> BinOp {
        match self {
            AtomicKind::Add => BinOp::Add,
            AtomicKind::Sub => BinOp::Sub,
            AtomicKind::Min | AtomicKind::Max => BinOp::Lt,
            AtomicKind::And => BinOp::BitAnd,
            AtomicKind::Or => BinOp::BitOr,
            AtomicKind::Xor => BinOp::BitXor,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AtomicTarget {
    /// An element of a field, addressed by a `GlobalPtr`.
    Global { field: FieldId, ptr: StmtId },
    /// A local slot component.
    Local { slot: StmtId, indices: Vec<Operand> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureOpKind {
    Load,
    Store,
    Sample,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopControl {
    Break,
    Continue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub id: StmtId,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    /// A function-local variable.
    Alloca { ty: Type, hint: String },
    /// Read a slot, or one component/row of it when `indices` is non-empty.
    LocalLoad {
        slot: StmtId,
        indices: Vec<Operand>,
        ty: Type,
    },
    LocalStore {
        slot: StmtId,
        indices: Vec<Operand>,
        value: Operand,
    },
    /// Word address of `field[indices]` plus a component offset.
    GlobalPtr {
        field: FieldId,
        indices: Vec<Operand>,
        offset: Operand,
    },
    GlobalLoad { ptr: StmtId, ty: Type },
    GlobalStore { ptr: StmtId, value: Operand },
    BinaryOp {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
        operand_ty: Type,
        ty: Type,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Operand,
        ty: Type,
    },
    /// Build a vector or matrix from scalar components in row-major order.
    Compose { parts: Vec<Operand>, ty: Type },
    /// A vector component, a matrix row, or a matrix element.
    Extract {
        value: Operand,
        indices: Vec<Operand>,
        ty: Type,
    },
    /// Loop over `begin..end`; the statement's own id is the loop index.
    RangeFor {
        begin: Operand,
        end: Operand,
        body: Vec<Stmt>,
        hint: String,
    },
    /// `cond_body` recomputes `cond` before every iteration.
    While {
        cond_body: Vec<Stmt>,
        cond: Operand,
        body: Vec<Stmt>,
    },
    If {
        cond: Operand,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    LoopControl(LoopControl),
    /// Read-modify-write; yields the previous value.
    AtomicOp {
        target: AtomicTarget,
        op: AtomicKind,
        value: Operand,
        ty: Type,
    },
    Call {
        intrinsic: &'static Intrinsic,
        args: Vec<Operand>,
        arg_tys: Vec<Type>,
        ty: Type,
    },
    TextureOp {
        texture: TextureId,
        op: TextureOpKind,
        coords: Operand,
        value: Option<Operand>,
        ty: Type,
    },
    /// Write the kernel result.
    Return { value: Operand, ty: Type },
    /// Uniform random f32 in [0, 1).
    Random { ty: Type },
    /// Runtime scalar argument `index`.
    ArgLoad { index: u32, ty: Type },
}

impl StmtKind {
    /// Type of the value this statement produces, if any.
    pub fn result_type(&self) -> Option<Type> {
        match self {
            StmtKind::LocalLoad { ty, .. }
            | StmtKind::GlobalLoad { ty, .. }
            | StmtKind::BinaryOp { ty, .. }
            | StmtKind::UnaryOp { ty, .. }
            | StmtKind::Compose { ty, .. }
            | StmtKind::Extract { ty, .. }
            | StmtKind::AtomicOp { ty, .. }
            | StmtKind::Call { ty, .. }
            | StmtKind::Random { ty }
            | StmtKind::ArgLoad { ty, .. } => Some(ty.clone()),
            StmtKind::TextureOp { op, ty, .. } if *op != TextureOpKind::Store => Some(ty.clone()),
            StmtKind::GlobalPtr { .. } | StmtKind::RangeFor { .. } => Some(crate::types::I32),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Alloca { .. } => "alloca",
            StmtKind::LocalLoad { .. } => "local_load",
            StmtKind::LocalStore { .. } => "local_store",
            StmtKind::GlobalPtr { .. } => "global_ptr",
            StmtKind::GlobalLoad { .. } => "global_load",
            StmtKind::GlobalStore { .. } => "global_store",
            StmtKind::BinaryOp { .. } => "binary_op",
            StmtKind::UnaryOp { .. } => "unary_op",
            StmtKind::Compose { .. } => "compose",
            StmtKind::Extract { .. } => "extract",
            StmtKind::RangeFor { .. } => "range_for",
            StmtKind::While { .. } => "while",
            StmtKind::If { .. } => "if",
            StmtKind::LoopControl(_) => "loop_control",
            StmtKind::AtomicOp { .. } => "atomic_op",
            StmtKind::Call { .. } => "call",
            StmtKind::TextureOp { .. } => "texture_op",
            StmtKind::Return { .. } => "return",
            StmtKind::Random { .. } => "random",
            StmtKind::ArgLoad { .. } => "arg_load",
        }
    }

    /// Nested statement lists, in execution order.
    pub fn children(&self) -> Vec<&[Stmt]> {
        match self {
            StmtKind::RangeFor { body, .. } => vec![body.as_slice()],
            StmtKind::While {
                cond_body, body, ..
            } => vec![cond_body.as_slice(), body.as_slice()],
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => vec![then_body.as_slice(), else_body.as_slice()],
            _ => Vec::new(),
        }
    }
}

/// Visit every statement in `stmts`, depth-first, parents before children.
pub fn walk<'a>(stmts: &'a [Stmt], visit: &mut impl FnMut(&'a Stmt)) {
    for stmt in stmts {
        visit(stmt);
        for child in stmt.kind.children() {
            walk(child, visit);
        }
    }
}

// ─── Kernel ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct KernelParam {
    pub name: String,
    pub ty: Type,
}

/// A grid-stride loop distributed over device threads.
#[derive(Clone, Debug, PartialEq)]
pub struct ParallelLoop {
    /// Statements computing the loop bounds.
    pub prologue: Vec<Stmt>,
    pub begin: Operand,
    pub end: Operand,
    pub index: StmtId,
    pub hint: String,
    /// Trip count when both bounds are constant.
    pub threads: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskKind {
    Serial,
    Parallel(ParallelLoop),
}

/// One compute dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub kind: TaskKind,
    pub body: Vec<Stmt>,
}

impl Task {
    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, TaskKind::Parallel(_))
    }

    /// Whether any statement of the task, prologue included, matches `pred`.
    pub fn any(&self, pred: impl Fn(&StmtKind) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |s| found |= pred(&s.kind));
        found
    }

    /// Every statement of the task including a parallel prologue.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Stmt)) {
        if let TaskKind::Parallel(lp) = &self.kind {
            walk(&lp.prologue, visit);
        }
        walk(&self.body, visit);
    }
}

/// A top-level slot shared between tasks, stored in the temporaries buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalTmp {
    pub slot: StmtId,
    /// Word offset in the temporaries buffer.
    pub offset: u32,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelIr {
    pub name: String,
    pub params: Vec<KernelParam>,
    pub ret: Option<Type>,
    pub tasks: Vec<Task>,
    pub global_tmps: Vec<GlobalTmp>,
    /// Fields the kernel touches, ordered by id.
    pub fields: Vec<Arc<FieldInfo>>,
    pub textures: Vec<Arc<TextureInfo>>,
}

impl KernelIr {
    /// All statements of all tasks, depth-first.
    pub fn statements(&self) -> Vec<&Stmt> {
        let mut out = Vec::new();
        for task in &self.tasks {
            task.walk(&mut |s| out.push(s));
        }
        out
    }

    pub fn count(&self, pred: impl Fn(&StmtKind) -> bool) -> usize {
        self.statements().iter().filter(|s| pred(&s.kind)).count()
    }

    pub fn field(&self, id: FieldId) -> Option<&Arc<FieldInfo>> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Arc<TextureInfo>> {
        self.textures.iter().find(|t| t.id == id)
    }

    pub fn global_tmp(&self, slot: StmtId) -> Option<&GlobalTmp> {
        self.global_tmps.iter().find(|t| t.slot == slot)
    }

    pub fn uses_random(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| t.any(|k| matches!(k, StmtKind::Random { .. })))
    }

    /// Words of the argument buffer holding parameters, in declaration order.
    pub fn param_words(&self) -> u32 {
        self.params.iter().map(|p| p.ty.component_count()).sum()
    }

    pub fn tmps_words(&self) -> u32 {
        self.global_tmps
            .iter()
            .map(|t| t.offset + t.ty.component_count())
            .max()
            .unwrap_or(0)
    }

    /// Promote top-level slots that are touched by more than one task.
    pub(crate) fn promote_shared_slots(&mut self) {
        let mut owner = std::collections::BTreeMap::new();
        let mut users: Vec<BTreeSet<StmtId>> = Vec::new();
        for (t, task) in self.tasks.iter().enumerate() {
            let mut used = BTreeSet::new();
            task.walk(&mut |s| match &s.kind {
                StmtKind::Alloca { ty, .. } => {
                    owner.insert(s.id, (t, ty.clone()));
                }
                StmtKind::LocalLoad { slot, .. } | StmtKind::LocalStore { slot, .. } => {
                    used.insert(*slot);
                }
                StmtKind::AtomicOp {
                    target: AtomicTarget::Local { slot, .. },
                    ..
                } => {
                    used.insert(*slot);
                }
                _ => {}
            });
            users.push(used);
        }

        let mut offset = 0u32;
        let mut tmps = Vec::new();
        for (slot, (home, ty)) in owner {
            let shared = users
                .iter()
                .enumerate()
                .any(|(t, used)| t != home && used.contains(&slot));
            if shared {
                tmps.push(GlobalTmp {
                    slot,
                    offset,
                    ty: ty.clone(),
                });
                offset += ty.component_count();
            }
        }
        self.global_tmps = tmps;
    }
}

// ─── Display ──────────────────────────────────────────────────────

fn fmt_operands(ops: &[Operand]) -> String {
    ops.iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_block(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        fmt_stmt(f, stmt, depth)?;
    }
    Ok(())
}

fn fmt_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    let id = stmt.id;
    match &stmt.kind {
        StmtKind::Alloca { ty, hint } => writeln!(f, "{pad}{id} = alloca {ty} \"{hint}\""),
        StmtKind::LocalLoad { slot, indices, ty } => {
            writeln!(f, "{pad}{id} = local_load {slot}[{}] : {ty}", fmt_operands(indices))
        }
        StmtKind::LocalStore {
            slot,
            indices,
            value,
        } => writeln!(
            f,
            "{pad}local_store {slot}[{}] <- {value}",
            fmt_operands(indices)
        ),
        StmtKind::GlobalPtr {
            field,
            indices,
            offset,
        } => writeln!(
            f,
            "{pad}{id} = global_ptr field{}[{}] + {offset}",
            field.0,
            fmt_operands(indices)
        ),
        StmtKind::GlobalLoad { ptr, ty } => writeln!(f, "{pad}{id} = global_load {ptr} : {ty}"),
        StmtKind::GlobalStore { ptr, value } => {
            writeln!(f, "{pad}global_store {ptr} <- {value}")
        }
        StmtKind::BinaryOp {
            op, lhs, rhs, ty, ..
        } => writeln!(f, "{pad}{id} = {lhs} {} {rhs} : {ty}", op.symbol()),
        StmtKind::UnaryOp { op, operand, ty } => {
            writeln!(f, "{pad}{id} = {:?} {operand} : {ty}", op)
        }
        StmtKind::Compose { parts, ty } => {
            writeln!(f, "{pad}{id} = compose({}) : {ty}", fmt_operands(parts))
        }
        StmtKind::Extract { value, indices, ty } => {
            writeln!(f, "{pad}{id} = extract {value}[{}] : {ty}", fmt_operands(indices))
        }
        StmtKind::RangeFor {
            begin, end, body, ..
        } => {
            writeln!(f, "{pad}range_for {id} in {begin}..{end} {{")?;
            fmt_block(f, body, depth + 1)?;
            writeln!(f, "{pad}}}")
        }
        StmtKind::While {
            cond_body,
            cond,
            body,
        } => {
            writeln!(f, "{pad}while {{")?;
            fmt_block(f, cond_body, depth + 1)?;
            writeln!(f, "{pad}}} ({cond}) {{")?;
            fmt_block(f, body, depth + 1)?;
            writeln!(f, "{pad}}}")
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            writeln!(f, "{pad}if {cond} {{")?;
            fmt_block(f, then_body, depth + 1)?;
            if !else_body.is_empty() {
                writeln!(f, "{pad}}} else {{")?;
                fmt_block(f, else_body, depth + 1)?;
            }
            writeln!(f, "{pad}}}")
        }
        StmtKind::LoopControl(LoopControl::Break) => writeln!(f, "{pad}break"),
        StmtKind::LoopControl(LoopControl::Continue) => writeln!(f, "{pad}continue"),
        StmtKind::AtomicOp {
            target,
            op,
            value,
            ty,
        } => {
            let target = match target {
                AtomicTarget::Global { ptr, .. } => ptr.to_string(),
                AtomicTarget::Local { slot, indices } => {
                    format!("{}[{}]", slot, fmt_operands(indices))
                }
            };
            writeln!(f, "{pad}{id} = atomic_{:?} {target}, {value} : {ty}", op)
        }
        StmtKind::Call {
            intrinsic, args, ty, ..
        } => writeln!(
            f,
            "{pad}{id} = call {}({}) : {ty}",
            intrinsic.name,
            fmt_operands(args)
        ),
        StmtKind::TextureOp {
            texture,
            op,
            coords,
            value,
            ty,
        } => match value {
            Some(v) => writeln!(f, "{pad}texture_{:?} tex{}[{coords}] <- {v}", op, texture.0),
            None => writeln!(f, "{pad}{id} = texture_{:?} tex{}[{coords}] : {ty}", op, texture.0),
        },
        StmtKind::Return { value, ty } => writeln!(f, "{pad}return {value} : {ty}"),
        StmtKind::Random { ty } => writeln!(f, "{pad}{id} = random : {ty}"),
        StmtKind::ArgLoad { index, ty } => writeln!(f, "{pad}{id} = arg {index} : {ty}"),
    }
}

impl fmt::Display for KernelIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        write!(f, "kernel {}({})", self.name, params.join(", "))?;
        if let Some(ret) = &self.ret {
            write!(f, " -> {}", ret)?;
        }
        writeln!(f)?;
        for field in &self.fields {
            writeln!(f, "  field {} {:?} : {}", field.name, field.shape, field.elem)?;
        }
        for tmp in &self.global_tmps {
            writeln!(f, "  tmp {} @ {} : {}", tmp.slot, tmp.offset, tmp.ty)?;
        }
        for (i, task) in self.tasks.iter().enumerate() {
            match &task.kind {
                TaskKind::Serial => writeln!(f, "task {} serial {{", i)?,
                TaskKind::Parallel(lp) => {
                    fmt_block(f, &lp.prologue, 1)?;
                    writeln!(
                        f,
                        "task {} parallel {} in {}..{} {{",
                        i, lp.index, lp.begin, lp.end
                    )?;
                }
            }
            fmt_block(f, &task.body, 1)?;
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
