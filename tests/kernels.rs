use std::collections::HashMap;
use std::sync::Arc;

use tessera::error::CompileError;
use tessera::ir::{Literal, Operand, StmtKind};
use tessera::reflect::{reflect, ResourceKind};
use tessera::runtime::{HeadlessDevice, Runtime, Shared};
use tessera::scope::{FieldId, FieldInfo};
use tessera::syntax::ast::BinOp;
use tessera::types::{F32, I32};
use tessera::{compile_kernel, CompilerConfig, Config, Scope, Value};

fn field(id: u32, name: &str, shape: &[usize], elem: tessera::types::Type) -> Value {
    Value::Field(Arc::new(FieldInfo {
        id: FieldId(id),
        name: name.to_string(),
        shape: shape.to_vec(),
        elem,
    }))
}

fn compile(scope: &Scope, source: &str) -> Result<tessera::CompiledKernel, CompileError> {
    compile_kernel(scope, source, &CompilerConfig::default())
}

// ── Types ──

#[test]
fn test_scalar_broadcasts_over_vector() {
    let kernel = compile(&Scope::new(), "(a: f32, b: vec3f) => { return a + b }").unwrap();
    let ret = kernel.ret().unwrap();
    assert_eq!(ret.component_count(), 3);
    assert_eq!(kernel.ret_words(), 3);
    assert_eq!(kernel.arg_words(), 4);
}

#[test]
fn test_vector_lengths_must_agree() {
    let err = compile(&Scope::new(), "(a: vec2f, b: vec3f) => { return a + b }").unwrap_err();
    assert!(matches!(err, CompileError::ShapeMismatch { .. }));
}

// ── Determinism ──

#[test]
fn test_compile_is_deterministic() {
    let mut scope = Scope::new();
    scope.add_stored("x", field(0, "x", &[64], F32));
    let source = "(s: f32) => { for (let i of range(64)) { x[i] = x[i] * s } }";
    let a = compile(&scope, source).unwrap();
    let b = compile(&scope, source).unwrap();
    assert_eq!(a.tasks, b.tasks);
    assert_eq!(a.to_string(), b.to_string());
}

#[test]
fn test_runtime_reuses_pipeline_for_identical_source() {
    let rt = Runtime::headless(Config::default());
    let x = rt.field("x", &[64], F32).unwrap();
    let mut scope = Scope::new();
    scope.add_stored("x", Value::Field(x));
    let source = "() => { for (let i of range(64)) { x[i] = 1.0 } }";
    let a = rt.kernel(&scope, source).unwrap();
    let b = rt.kernel(&scope, source).unwrap();
    assert!(Shared::ptr_eq(&a.pipelines()[0], &b.pipelines()[0]));
    assert_eq!(rt.device().stats().shader_modules, 1);
}

// ── Scope ──

#[test]
fn test_scope_clone_and_merge() {
    let mut a = Scope::new();
    a.add_stored("n", Value::int(4));
    let mut copy = a.clone();
    copy.add_stored("n", Value::int(9));
    assert!(matches!(a.get_stored("n"), Some(Value::Number(_))));

    let mut b = Scope::new();
    b.add_stored("n", Value::int(16));
    b.add_stored("m", Value::float(0.5));
    let merged = Scope::merge(&a, &b);
    assert!(merged.has_stored("m"));

    let mut scope = merged.clone();
    scope.add_stored("x", field(0, "x", &[16], I32));
    let kernel = compile(&scope, "() => { for (let i of range(n)) { x[i] = i } }").unwrap();
    match &kernel.ir.tasks[0].kind {
        tessera::ir::TaskKind::Parallel(lp) => assert_eq!(lp.threads, Some(16)),
        other => panic!("expected a parallel task, got {:?}", other),
    }
}

// ── Lowering scenarios ──

#[test]
fn test_static_range_unrolls_to_literals() {
    let mut scope = Scope::new();
    scope.add_stored("x", field(0, "x", &[3], F32));
    let kernel = compile(
        &scope,
        "() => { for (let i of ti.static(ti.range(3))) { x[i] = x[i] + i } }",
    )
    .unwrap();
    assert_eq!(kernel.ir.count(|k| matches!(k, StmtKind::RangeFor { .. })), 0);
    let addends: Vec<Operand> = kernel
        .ir
        .statements()
        .into_iter()
        .filter_map(|s| match &s.kind {
            StmtKind::BinaryOp {
                op: BinOp::Add,
                rhs,
                ..
            } => Some(*rhs),
            _ => None,
        })
        .collect();
    assert_eq!(
        addends,
        vec![
            Operand::Const(Literal::F32(0.0)),
            Operand::Const(Literal::F32(1.0)),
            Operand::Const(Literal::F32(2.0)),
        ]
    );
    assert!(!kernel.tasks[0].wgsl.contains("for ("));
}

#[test]
fn test_atomic_counter_binding() {
    let mut scope = Scope::new();
    scope.add_stored("counter", field(5, "counter", &[1], I32));
    let kernel = compile(
        &scope,
        "() => { for (let i of range(1000)) { ti.atomicAdd(counter[0], 1) } }",
    )
    .unwrap();
    assert_eq!(kernel.ir.count(|k| matches!(k, StmtKind::AtomicOp { .. })), 1);

    let task = &kernel.tasks[0];
    let reflection = reflect(&task.wgsl).unwrap();
    let storage: Vec<_> = reflection
        .bindings
        .iter()
        .filter(|b| b.kind == ResourceKind::Field(FieldId(5)))
        .collect();
    assert_eq!(storage.len(), 1);
    assert!(task.wgsl.contains("array<atomic<i32>>"));
    assert_eq!(task.threads, 1000);
}

#[test]
fn test_template_bindings_change_the_shader() {
    let mut scope = Scope::new();
    scope.add_stored("x", field(0, "x", &[8], F32));
    let source = "(k: template) => { for (let i of range(8)) { x[i] = k } }";
    let bind = |v: f32| HashMap::from([("k".to_string(), Value::float(v))]);
    let config = CompilerConfig::default();
    let a = tessera::compile_kernel_with_templates(&scope, source, &bind(1.5), &config).unwrap();
    let b = tessera::compile_kernel_with_templates(&scope, source, &bind(2.5), &config).unwrap();
    assert!(a.params().is_empty());
    assert_ne!(a.tasks[0].fingerprint, b.tasks[0].fingerprint);
}

#[test]
fn test_unknown_name_is_reported() {
    let err = compile(&Scope::new(), "() => { y[0] = 1 }").unwrap_err();
    assert!(!err.to_diagnostics().is_empty());
}

// ── Runtime ──

#[test]
fn test_headless_launch_and_readback() {
    let rt: Runtime<HeadlessDevice> = Runtime::headless(Config::default());
    let x = rt.field("x", &[4], F32).unwrap();
    rt.write_field(&x, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let mut scope = Scope::new();
    scope.add_stored("x", Value::Field(x.clone()));
    let kernel = rt
        .kernel(&scope, "(s: f32) => { for (let i of range(4)) { x[i] = x[i] * s } }")
        .unwrap();
    let ret = rt.launch(&kernel, &[Value::float(2.0)]).unwrap().wait().unwrap();
    assert!(ret.is_empty());
    assert_eq!(rt.device().dispatches().len(), 1);
    // Headless dispatches are recorded, not executed.
    assert_eq!(rt.read_field::<f32>(&x).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_launch_is_a_future() {
    let rt = Runtime::headless(Config::default());
    let kernel = rt.kernel(&Scope::new(), "(a: i32) => { return a * 2 }").unwrap();
    let launch = rt.launch(&kernel, &[Value::int(3)]).unwrap();
    let ret = pollster::block_on(launch).unwrap();
    assert_eq!(ret, vec![Literal::I32(0)]);
}
