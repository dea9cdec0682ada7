//! Kernel compile driver: source + scope → per-task WGSL.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::codegen::{self, TaskShader};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::ir::{KernelIr, KernelParam};
use crate::lower::{lower_kernel, KERNEL_FILE};
use crate::reflect::{reflect, ResourceBinding, ShaderReflection};
use crate::scope::{FieldInfo, Scope, TextureInfo, Value};
use crate::syntax::parse_function;
use crate::types::Type;

/// One compiled dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledTask {
    pub wgsl: String,
    /// Short blake3 digest of `wgsl`, used for labels and file names.
    pub fingerprint: String,
    pub reflection: ShaderReflection,
    pub bindings: Vec<ResourceBinding>,
    pub workgroup_size: u32,
    pub workgroups: u32,
    pub threads: u32,
    pub parallel: bool,
}

impl CompiledTask {
    fn new(shader: TaskShader) -> Result<Self, CompileError> {
        let reflection = reflect(&shader.wgsl)?;
        Ok(Self {
            fingerprint: fingerprint(&shader.wgsl),
            reflection,
            wgsl: shader.wgsl,
            bindings: shader.bindings,
            workgroup_size: shader.workgroup_size,
            workgroups: shader.workgroups,
            threads: shader.threads,
            parallel: shader.parallel,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CompiledKernel {
    pub name: String,
    pub ir: KernelIr,
    pub tasks: Vec<CompiledTask>,
}

impl CompiledKernel {
    pub fn params(&self) -> &[KernelParam] {
        &self.ir.params
    }

    pub fn ret(&self) -> Option<&Type> {
        self.ir.ret.as_ref()
    }

    pub fn fields(&self) -> &[Arc<FieldInfo>] {
        &self.ir.fields
    }

    pub fn textures(&self) -> &[Arc<TextureInfo>] {
        &self.ir.textures
    }

    /// Words of the argument buffer: parameter components, then the random
    /// seed when `random()` is used.
    pub fn arg_words(&self) -> u32 {
        self.ir.param_words() + u32::from(self.ir.uses_random())
    }

    pub fn ret_words(&self) -> u32 {
        self.ir.ret.as_ref().map_or(0, |t| t.component_count())
    }

    pub fn tmps_words(&self) -> u32 {
        self.ir.tmps_words()
    }
}

impl fmt::Display for CompiledKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, task) in self.tasks.iter().enumerate() {
            writeln!(
                f,
                "// task {} [{}] {} x {} threads",
                i, task.fingerprint, task.workgroups, task.workgroup_size
            )?;
            writeln!(f, "{}", task.wgsl)?;
        }
        Ok(())
    }
}

/// 16 hex digits of the blake3 hash of `text`.
pub fn fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex()[..16].to_string()
}

/// Stable cache key for a set of template bindings.
pub fn template_key(templates: &HashMap<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = templates.iter().collect();
    fingerprint(&format!("{:?}", sorted))
}

/// Compile a kernel with no template parameters.
pub fn compile_kernel(
    scope: &Scope,
    source: &str,
    config: &CompilerConfig,
) -> Result<CompiledKernel, CompileError> {
    compile_kernel_with_templates(scope, source, &HashMap::new(), config)
}

/// Compile a kernel, binding `template` parameters to compile-time values.
pub fn compile_kernel_with_templates(
    scope: &Scope,
    source: &str,
    templates: &HashMap<String, Value>,
    config: &CompilerConfig,
) -> Result<CompiledKernel, CompileError> {
    let decl = parse_function(source, KERNEL_FILE).map_err(CompileError::Parse)?;
    let ir = lower_kernel(&decl, scope, templates, config)?;
    tracing::trace!("kernel IR:\n{}", ir);

    let tasks = codegen::generate(&ir, config)
        .into_iter()
        .map(CompiledTask::new)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        "compiled kernel `{}`: {} task(s), {} param(s), {} field(s), {} shared word(s)",
        ir.name,
        tasks.len(),
        ir.params.len(),
        ir.fields.len(),
        ir.tmps_words()
    );

    Ok(CompiledKernel {
        name: ir.name.clone(),
        ir,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{FieldId, FieldInfo};
    use crate::types::F32;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.add_stored(
            "x",
            Value::Field(Arc::new(FieldInfo {
                id: FieldId(0),
                name: "x".to_string(),
                shape: vec![64],
                elem: F32,
            })),
        );
        scope
    }

    #[test]
    fn test_compile_produces_reflected_tasks() {
        let kernel = compile_kernel(
            &scope(),
            "(k: f32) => { for (let i of range(64)) { x[i] = k * i } return 1 }",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert_eq!(kernel.tasks.len(), 2);
        assert!(kernel.tasks[0].parallel);
        assert_eq!(kernel.tasks[0].reflection.bindings, kernel.tasks[0].bindings);
        assert_eq!(kernel.tasks[0].fingerprint.len(), 16);
        assert_eq!(kernel.arg_words(), 1);
        assert_eq!(kernel.ret_words(), 1);
        assert_eq!(kernel.fields().len(), 1);
    }

    #[test]
    fn test_errors_abort_compile() {
        let err = compile_kernel(&scope(), "() => { x[0] = nope }", &CompilerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedSymbol { .. }));
        let err = compile_kernel(&scope(), "() => { let = }", &CompilerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn test_template_key_is_order_independent() {
        let mut a = HashMap::new();
        a.insert("n".to_string(), Value::int(3));
        a.insert("s".to_string(), Value::float(0.5));
        let mut b = HashMap::new();
        b.insert("s".to_string(), Value::float(0.5));
        b.insert("n".to_string(), Value::int(3));
        assert_eq!(template_key(&a), template_key(&b));
        b.insert("n".to_string(), Value::int(4));
        assert_ne!(template_key(&a), template_key(&b));
    }

    #[test]
    fn test_same_source_same_fingerprint() {
        let source = "() => { for (let i of range(64)) { x[i] = 2.0 } }";
        let a = compile_kernel(&scope(), source, &CompilerConfig::default()).unwrap();
        let b = compile_kernel(&scope(), source, &CompilerConfig::default()).unwrap();
        assert_eq!(a.tasks[0].fingerprint, b.tasks[0].fingerprint);
    }
}
