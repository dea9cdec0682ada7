//! WGSL generation.
//!
//! Every task of a `KernelIr` becomes one compute shader with a single
//! entry point `main`. Statement values become `let` bindings named
//! `_{id}`; slots and loop indices become `var`s named `_{id}_{hint}`.
//! Resources get `(group 0, binding n)` in the order the emitter first
//! touches them, and the binding header is assembled after the body.
//!
//! Fields are flat `array<i32>` word buffers. Element `[i0, .., ik]` of a
//! field with component count `c` starts at word
//! `(i0 * s0 + .. + ik * sk) * c`, where `s` are the row-major strides of the
//! field shape. `f32` and `u32` components are stored through `bitcast`.

mod expr;
mod stmt;

use std::collections::{BTreeSet, HashMap};

use crate::config::CompilerConfig;
use crate::ir::{AtomicTarget, KernelIr, StmtId, StmtKind, Task, TaskKind};
use crate::reflect::{Access, ResourceBinding, ResourceKind};
use crate::scope::{FieldId, TextureInfo};
use crate::types::Type;

pub(crate) use expr::Addr;

/// Most workgroups a single dispatch dimension may have.
pub const MAX_WORKGROUPS: u32 = 65535;

/// The WGSL program for one task and its dispatch shape.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskShader {
    pub wgsl: String,
    /// Resources in binding order.
    pub bindings: Vec<ResourceBinding>,
    pub workgroup_size: u32,
    pub workgroups: u32,
    /// Invocations the dispatch is sized for.
    pub threads: u32,
    pub parallel: bool,
}

/// Generate one shader per task, in task order.
pub fn generate(ir: &KernelIr, config: &CompilerConfig) -> Vec<TaskShader> {
    ir.tasks
        .iter()
        .enumerate()
        .map(|(index, task)| TaskEmitter::new(ir, config, index).emit(task))
        .collect()
}

/// Workgroup count covering `threads` invocations, capped at the dispatch
/// limit. Parallel loops stride over whatever the grid does not cover.
pub fn workgroup_count(threads: u32, workgroup_size: u32) -> u32 {
    threads
        .div_ceil(workgroup_size.max(1))
        .clamp(1, MAX_WORKGROUPS)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    FloorDiv,
    Random,
}

impl Helper {
    fn source(self) -> &'static str {
        match self {
            Helper::FloorDiv => {
                "fn floor_div_i32(a: i32, b: i32) -> i32 {
    let q = a / b;
    if (a % b != 0i && (a < 0i) != (b < 0i)) {
        return q - 1i;
    }
    return q;
}"
            }
            Helper::Random => {
                "var<private> rng_state: u32;

fn rng_next() -> f32 {
    rng_state = rng_state * 747796405u + 2891336453u;
    var word = ((rng_state >> ((rng_state >> 28u) + 4u)) ^ rng_state) * 277803737u;
    word = (word >> 22u) ^ word;
    return f32(word >> 8u) * (1.0 / 16777216.0);
}

fn rng_seed(invocation: u32, seed: u32) {
    rng_state = (invocation * 2654435769u) ^ seed;
    _ = rng_next();
}"
            }
        }
    }
}

/// Where a slot lives.
#[derive(Clone, Debug)]
enum Slot {
    Var { name: String, ty: Type },
    /// Promoted to the temporaries buffer at a word offset.
    Tmp { offset: u32, ty: Type },
}

/// Emits the WGSL program of one task.
pub(crate) struct TaskEmitter<'a> {
    ir: &'a KernelIr,
    config: &'a CompilerConfig,
    /// Task position within the kernel, mixed into the random seed.
    task_index: usize,
    /// Lines of the `main` body.
    output: Vec<String>,
    indent: usize,
    /// Expression naming each statement value.
    names: HashMap<StmtId, String>,
    types: HashMap<StmtId, Type>,
    ptrs: HashMap<StmtId, (FieldId, Addr)>,
    slots: HashMap<StmtId, Slot>,
    /// Resources in first-reference order; the position is the binding.
    bindings: Vec<ResourceBinding>,
    atomic_fields: BTreeSet<FieldId>,
    written_fields: BTreeSet<FieldId>,
    helpers: BTreeSet<Helper>,
}

impl<'a> TaskEmitter<'a> {
    pub(crate) fn new(ir: &'a KernelIr, config: &'a CompilerConfig, task_index: usize) -> Self {
        Self {
            ir,
            config,
            task_index,
            output: Vec::new(),
            indent: 1,
            names: HashMap::new(),
            types: HashMap::new(),
            ptrs: HashMap::new(),
            slots: HashMap::new(),
            bindings: Vec::new(),
            atomic_fields: BTreeSet::new(),
            written_fields: BTreeSet::new(),
            helpers: BTreeSet::new(),
        }
    }

    pub(crate) fn emit(mut self, task: &Task) -> TaskShader {
        self.scan_field_usage(task);
        self.declare_promoted_slots();

        if task.any(|k| matches!(k, StmtKind::Random { .. })) {
            self.helpers.insert(Helper::Random);
            let args = self.resource(ResourceKind::Args);
            let seed_word = self.ir.param_words();
            self.line(format!(
                "rng_seed(gid.x, bitcast<u32>({}[{}]) ^ {}u);",
                args, seed_word, self.task_index
            ));
        }

        let (workgroup_size, threads, parallel) = match &task.kind {
            TaskKind::Serial => {
                self.emit_block(&task.body);
                (1, 1, false)
            }
            TaskKind::Parallel(lp) => {
                let workgroup_size = self.config.workgroup_size;
                let threads = lp.threads.unwrap_or(self.config.dynamic_threads);
                let stride = workgroup_count(threads, workgroup_size) * workgroup_size;

                self.emit_block(&lp.prologue);
                let index = self.declare_var(lp.index, &lp.hint, crate::types::I32);
                let begin = self.operand(&lp.begin);
                let end = self.operand(&lp.end);
                self.line(format!(
                    "for (var {index}: i32 = {begin} + i32(gid.x); {index} < {end}; {index} = {index} + {stride}i) {{"
                ));
                self.indent += 1;
                self.emit_block(&task.body);
                self.indent -= 1;
                self.line("}".to_string());
                (workgroup_size, threads, true)
            }
        };
        let workgroups = if parallel {
            workgroup_count(threads, workgroup_size)
        } else {
            1
        };

        let wgsl = self.assemble(task, workgroup_size);
        TaskShader {
            wgsl,
            bindings: self.bindings,
            workgroup_size,
            workgroups,
            threads,
            parallel,
        }
    }

    fn line(&mut self, text: String) {
        self.output
            .push(format!("{}{}", "    ".repeat(self.indent), text));
    }

    // ─── Resources ────────────────────────────────────────────────

    /// Fields stored to, and fields needing atomic word arrays.
    fn scan_field_usage(&mut self, task: &Task) {
        let mut ptr_field = HashMap::new();
        task.walk(&mut |s| match &s.kind {
            StmtKind::GlobalPtr { field, .. } => {
                ptr_field.insert(s.id, *field);
            }
            StmtKind::GlobalStore { ptr, .. } => {
                if let Some(field) = ptr_field.get(ptr) {
                    self.written_fields.insert(*field);
                }
            }
            StmtKind::AtomicOp {
                target: AtomicTarget::Global { field, .. },
                ..
            } => {
                self.atomic_fields.insert(*field);
                self.written_fields.insert(*field);
            }
            _ => {}
        });
    }

    fn declare_promoted_slots(&mut self) {
        for tmp in &self.ir.global_tmps {
            self.slots.insert(
                tmp.slot,
                Slot::Tmp {
                    offset: tmp.offset,
                    ty: tmp.ty.clone(),
                },
            );
        }
    }

    fn field_var_name(&self, id: FieldId) -> String {
        let name = self
            .ir
            .field(id)
            .map(|f| crate::lower::sanitize_hint(&f.name))
            .unwrap_or_default();
        if name.is_empty() {
            format!("field_{}", id.0)
        } else {
            format!("field_{}_{}", id.0, name)
        }
    }

    /// Binding variable for `kind`, registering it on first use.
    pub(crate) fn resource(&mut self, kind: ResourceKind) -> String {
        if let Some(existing) = self.bindings.iter().find(|b| b.kind == kind) {
            return existing.name.clone();
        }
        let (name, access) = match kind {
            ResourceKind::Field(id) => {
                let access = if self.written_fields.contains(&id) {
                    Access::ReadWrite
                } else {
                    Access::Read
                };
                (self.field_var_name(id), access)
            }
            ResourceKind::Args => ("args".to_string(), Access::Read),
            ResourceKind::Rets => ("rets".to_string(), Access::ReadWrite),
            ResourceKind::GlobalTmps => ("global_tmps".to_string(), Access::ReadWrite),
            ResourceKind::Texture(id) => (format!("tex_{}", id.0), Access::Read),
            ResourceKind::StorageTexture(id) => (format!("storage_tex_{}", id.0), Access::Write),
            ResourceKind::Sampler(id) => (format!("sampler_{}", id.0), Access::Read),
        };
        self.bindings.push(ResourceBinding {
            group: 0,
            binding: self.bindings.len() as u32,
            kind,
            access,
            name: name.clone(),
        });
        name
    }

    fn binding_decl(&self, binding: &ResourceBinding) -> String {
        let texture = |id| self.ir.texture(id).map(|t| t.as_ref());
        let ty = match binding.kind {
            ResourceKind::Field(id) if self.atomic_fields.contains(&id) => {
                "array<atomic<i32>>".to_string()
            }
            ResourceKind::GlobalTmps => "array<atomic<i32>>".to_string(),
            ResourceKind::Field(_) | ResourceKind::Args | ResourceKind::Rets => {
                "array<i32>".to_string()
            }
            ResourceKind::Texture(id) => sampled_texture_type(texture(id)),
            ResourceKind::StorageTexture(id) => storage_texture_type(texture(id)),
            ResourceKind::Sampler(_) => "sampler".to_string(),
        };
        let var = if binding.kind.is_buffer() {
            format!("var<storage, {}>", binding.access.wgsl())
        } else {
            "var".to_string()
        };
        format!(
            "@group({}) @binding({}) {} {}: {};",
            binding.group, binding.binding, var, binding.name, ty
        )
    }

    fn assemble(&self, task: &Task, workgroup_size: u32) -> String {
        let mut out = Vec::new();
        out.push(format!(
            "// {} task {} ({})",
            self.ir.name,
            self.task_index,
            if task.is_parallel() { "parallel" } else { "serial" }
        ));
        for binding in &self.bindings {
            out.push(self.binding_decl(binding));
        }
        for helper in &self.helpers {
            out.push(String::new());
            out.push(helper.source().to_string());
        }
        out.push(String::new());
        out.push(format!("@compute @workgroup_size({})", workgroup_size));
        out.push("fn main(@builtin(global_invocation_id) gid: vec3<u32>) {".to_string());
        out.extend(self.output.iter().cloned());
        out.push("}".to_string());
        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

fn sampled_texture_type(texture: Option<&TextureInfo>) -> String {
    let rank = texture.map_or(2, |t| t.rank());
    format!("texture_{}d<f32>", rank)
}

fn storage_texture_type(texture: Option<&TextureInfo>) -> String {
    let rank = texture.map_or(2, |t| t.rank());
    let format = texture.map_or("rgba32float", |t| t.format.wgsl_name());
    format!("texture_storage_{}d<{}, write>", rank, format)
}

#[cfg(test)]
mod tests;
