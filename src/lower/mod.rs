//! Lowering: kernel AST + Scope → `KernelIr`.
//!
//! The lowerer walks the kernel body once, emitting typed IR statements into
//! a stack of open blocks. Top-level non-static `for` loops become parallel
//! tasks; everything else at the top level is gathered into serial tasks.
//! Helper functions are inlined at each call site.

mod call;
mod expr;
mod helpers;
mod stmt;

pub(crate) use helpers::sanitize_hint;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::ir::{KernelIr, KernelParam, Operand, Stmt, StmtId, StmtKind, Task, TaskKind};
use crate::scope::{FieldId, FieldInfo, FunctionSource, Scope, TextureId, TextureInfo, Value};
use crate::syntax::ast::{FnDecl, Stmt as AstStmt};
use crate::syntax::span::Spanned;
use crate::types::Type;

/// File id of the kernel's own source.
pub const KERNEL_FILE: u16 = 0;

// ─── Lowered values ───────────────────────────────────────────────

/// An assignable location.
#[derive(Clone, Debug, PartialEq)]
pub enum Place {
    /// A local slot, or a component/row of one.
    Local {
        slot: StmtId,
        slot_ty: Type,
        indices: Vec<Operand>,
        ty: Type,
    },
    /// Element `indices` of a field, `offset` components in.
    Global {
        field: Arc<FieldInfo>,
        indices: Vec<Operand>,
        offset: Operand,
        ty: Type,
    },
}

impl Place {
    pub fn ty(&self) -> &Type {
        match self {
            Place::Local { ty, .. } | Place::Global { ty, .. } => ty,
        }
    }
}

/// Result of lowering an expression.
#[derive(Clone, Debug)]
pub(crate) enum Lowered {
    Value(Operand, Type),
    Place(Place),
    /// A host value known at compile time.
    Static(Value),
    /// A struct rvalue.
    Record(Vec<(String, Lowered)>),
    Void,
}

impl Lowered {
    fn kind_name(&self) -> &'static str {
        match self {
            Lowered::Value(..) => "value",
            Lowered::Place(_) => "variable",
            Lowered::Static(v) => v.kind_name(),
            Lowered::Record(_) => "struct",
            Lowered::Void => "void",
        }
    }
}

/// What the innermost enclosing loop is, for `break`/`continue` checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoopKind {
    Serial,
    Parallel,
    Static,
    /// Boundary of an inlined function body.
    Function,
}

// ─── Lowerer ──────────────────────────────────────────────────────

pub(crate) struct Lowerer<'a> {
    pub(crate) config: &'a CompilerConfig,
    /// Host bindings every inlined function starts from.
    pub(crate) globals: Scope,
    /// Next statement id.
    pub(crate) next_id: u32,
    /// Open statement lists; the last one receives emitted statements.
    pub(crate) blocks: Vec<Vec<Stmt>>,
    /// Finished tasks in dispatch order.
    pub(crate) tasks: Vec<Task>,
    pub(crate) loops: Vec<LoopKind>,
    /// Functions currently being inlined, by declaration identity.
    pub(crate) inline_stack: Vec<usize>,
    /// Library functions parsed so far in this compile.
    pub(crate) library: HashMap<&'static str, Arc<FunctionSource>>,
    /// Kernel result type, once a top-level `return` is lowered.
    pub(crate) ret: Option<Type>,
    /// Resources referenced so far.
    pub(crate) fields: BTreeMap<FieldId, Arc<FieldInfo>>,
    pub(crate) textures: BTreeMap<TextureId, Arc<TextureInfo>>,
}

/// Lower a parsed kernel.
///
/// `templates` supplies compile-time values for `template` parameters.
pub fn lower_kernel(
    decl: &FnDecl,
    scope: &Scope,
    templates: &HashMap<String, Value>,
    config: &CompilerConfig,
) -> Result<KernelIr, CompileError> {
    let mut lowerer = Lowerer::new(scope, config);
    let mut local = scope.clone();
    let params = lowerer.bind_params(decl, templates, &mut local)?;

    lowerer.lower_top_block(&decl.body.node.stmts, &mut local, true)?;
    lowerer.flush_serial();

    let name = decl
        .name
        .as_ref()
        .map(|n| n.node.clone())
        .unwrap_or_else(|| "kernel".to_string());
    let mut ir = KernelIr {
        name,
        params,
        ret: lowerer.ret.take(),
        tasks: std::mem::take(&mut lowerer.tasks),
        global_tmps: Vec::new(),
        fields: std::mem::take(&mut lowerer.fields).into_values().collect(),
        textures: std::mem::take(&mut lowerer.textures).into_values().collect(),
    };
    ir.promote_shared_slots();
    Ok(ir)
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(scope: &Scope, config: &'a CompilerConfig) -> Self {
        Self {
            config,
            globals: scope.globals(),
            next_id: 0,
            blocks: vec![Vec::new()],
            tasks: Vec::new(),
            loops: Vec::new(),
            inline_stack: Vec::new(),
            library: HashMap::new(),
            ret: None,
            fields: BTreeMap::new(),
            textures: BTreeMap::new(),
        }
    }

    fn bind_params(
        &mut self,
        decl: &FnDecl,
        templates: &HashMap<String, Value>,
        scope: &mut Scope,
    ) -> Result<Vec<KernelParam>, CompileError> {
        let mut params = Vec::new();
        let mut word = 0u32;
        for param in &decl.params {
            let name = &param.name.node;
            let annotation = param.annotation.as_ref();
            if matches!(annotation.map(|a| a.node.as_str()), Some("template" | "ti.template")) {
                let value = templates
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CompileError::NotConstant {
                        what: format!("template parameter `{}`", name),
                        span: param.name.span,
                    })?;
                scope.add_stored(name.as_str(), value);
                continue;
            }
            let ty = match annotation {
                None => crate::types::F32,
                Some(a) => match Type::parse(&a.node) {
                    Some(ty) => ty,
                    None => {
                        return Err(CompileError::InvalidType {
                            message: format!("unknown parameter type `{}`", a.node),
                            span: a.span,
                        })
                    }
                },
            };
            scope.add_stored(
                name.as_str(),
                Value::Arg {
                    index: word,
                    ty: ty.clone(),
                },
            );
            word += ty.component_count();
            params.push(KernelParam {
                name: name.clone(),
                ty,
            });
        }
        Ok(params)
    }

    // ─── Task split ───────────────────────────────────────────────

    /// Lower statements at kernel top level, where `for` loops fan out.
    pub(crate) fn lower_top_block(
        &mut self,
        stmts: &[Spanned<AstStmt>],
        scope: &mut Scope,
        is_body: bool,
    ) -> Result<(), CompileError> {
        for (i, stmt) in stmts.iter().enumerate() {
            let is_last = is_body && i + 1 == stmts.len();
            match &stmt.node {
                AstStmt::For {
                    binding,
                    iter,
                    body,
                } => {
                    let range = self.analyze_range(iter)?;
                    if range.is_static {
                        self.unroll(binding, &range, body, scope, stmt.span, true)?;
                    } else {
                        self.lower_parallel_for(binding, range, body, scope)?;
                    }
                }
                AstStmt::Block(block) => {
                    let mut inner = scope.clone();
                    self.lower_top_block(&block.stmts, &mut inner, false)?;
                }
                AstStmt::Return(value) if is_last => {
                    self.lower_kernel_return(value.as_ref(), scope, stmt.span)?;
                }
                _ => self.lower_stmt(stmt, scope)?,
            }
        }
        Ok(())
    }

    /// Close the open serial statements into a task.
    pub(crate) fn flush_serial(&mut self) {
        let body = std::mem::take(self.current_block());
        if !body.is_empty() {
            self.tasks.push(Task {
                kind: TaskKind::Serial,
                body,
            });
        }
    }

    // ─── Builder ──────────────────────────────────────────────────

    pub(crate) fn fresh_id(&mut self) -> StmtId {
        let id = StmtId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn current_block(&mut self) -> &mut Vec<Stmt> {
        if self.blocks.is_empty() {
            self.blocks.push(Vec::new());
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    pub(crate) fn push_stmt(&mut self, stmt: Stmt) {
        self.current_block().push(stmt);
    }

    pub(crate) fn emit(&mut self, kind: StmtKind) -> StmtId {
        let id = self.fresh_id();
        self.push_stmt(Stmt { id, kind });
        id
    }

    pub(crate) fn emit_value(&mut self, kind: StmtKind) -> Operand {
        Operand::Stmt(self.emit(kind))
    }

    pub(crate) fn open_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    pub(crate) fn close_block(&mut self) -> Vec<Stmt> {
        self.blocks.pop().unwrap_or_default()
    }

    /// Run `f` with statements collected into a fresh block.
    pub(crate) fn in_block<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<(Vec<Stmt>, T), CompileError> {
        self.open_block();
        let result = f(self);
        let block = self.close_block();
        result.map(|value| (block, value))
    }

    pub(crate) fn in_loop<T>(
        &mut self,
        kind: LoopKind,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.loops.push(kind);
        let result = f(self);
        self.loops.pop();
        result
    }
}

#[cfg(test)]
mod tests;
