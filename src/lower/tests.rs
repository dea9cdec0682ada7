use super::*;
use crate::ir::{AtomicTarget, Literal, StmtKind};
use crate::scope::FieldId;
use crate::syntax::ast::BinOp;
use crate::syntax::parse_function;
use crate::types::{Prim, StructTy, F32, I32};

fn field(id: u32, name: &str, shape: &[usize], elem: Type) -> Value {
    Value::Field(Arc::new(FieldInfo {
        id: FieldId(id),
        name: name.to_string(),
        shape: shape.to_vec(),
        elem,
    }))
}

fn scope() -> Scope {
    let mut scope = Scope::new();
    scope.add_stored("x", field(0, "x", &[8], F32));
    scope.add_stored("counter", field(1, "counter", &[1], I32));
    scope.add_stored("g", field(2, "g", &[4, 5], I32));
    scope
}

fn lower_with(
    scope: &Scope,
    source: &str,
    templates: &HashMap<String, Value>,
    config: &CompilerConfig,
) -> Result<KernelIr, CompileError> {
    let decl = parse_function(source, KERNEL_FILE).map_err(CompileError::Parse)?;
    lower_kernel(&decl, scope, templates, config)
}

fn lower(scope: &Scope, source: &str) -> Result<KernelIr, CompileError> {
    lower_with(scope, source, &HashMap::new(), &CompilerConfig::default())
}

fn binary_ops(ir: &KernelIr, op: BinOp) -> Vec<StmtKind> {
    ir.statements()
        .into_iter()
        .filter(|s| matches!(&s.kind, StmtKind::BinaryOp { op: o, .. } if *o == op))
        .map(|s| s.kind.clone())
        .collect()
}

#[test]
fn test_static_loop_unrolls() {
    let ir = lower(
        &scope(),
        "() => { for (let i of ti.static(ti.range(4))) { x[i] = x[i] + i } }",
    )
    .unwrap();
    assert_eq!(ir.tasks.len(), 1);
    assert!(!ir.tasks[0].is_parallel());
    assert_eq!(ir.count(|k| matches!(k, StmtKind::RangeFor { .. })), 0);
    let rhs: Vec<Operand> = binary_ops(&ir, BinOp::Add)
        .into_iter()
        .filter_map(|k| match k {
            StmtKind::BinaryOp { rhs, .. } => Some(rhs),
            _ => None,
        })
        .collect();
    assert_eq!(
        rhs,
        (0..4)
            .map(|i| Operand::Const(Literal::F32(i as f32)))
            .collect::<Vec<_>>()
    );
    assert_eq!(ir.count(|k| matches!(k, StmtKind::GlobalStore { .. })), 4);
}

#[test]
fn test_static_loop_unrolls_into_local_accumulator() {
    let ir = lower(
        &scope(),
        "() => { let sum = 0; for (let i of ti.static(ti.range(4))) { sum = sum + i } }",
    )
    .unwrap();
    assert_eq!(ir.count(|k| matches!(k, StmtKind::RangeFor { .. })), 0);
    let rhs: Vec<Operand> = binary_ops(&ir, BinOp::Add)
        .into_iter()
        .filter_map(|k| match k {
            StmtKind::BinaryOp { rhs, .. } => Some(rhs),
            _ => None,
        })
        .collect();
    assert_eq!(
        rhs,
        (0..4).map(|i| Operand::Const(Literal::I32(i))).collect::<Vec<_>>()
    );
    assert_eq!(ir.count(|k| matches!(k, StmtKind::LocalStore { .. })), 5);
}

#[test]
fn test_unroll_limit() {
    let config = CompilerConfig {
        unroll_limit: 4,
        ..CompilerConfig::default()
    };
    let err = lower_with(
        &scope(),
        "() => { for (let i of ti.static(range(5))) { x[i] = 1.0 } }",
        &HashMap::new(),
        &config,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnrollLimitExceeded {
            count: 5,
            limit: 4,
            ..
        }
    ));
}

#[test]
fn test_atomic_add_on_field_element() {
    let ir = lower(
        &scope(),
        "() => { for (let i of range(16)) { atomicAdd(counter[0], 1) } }",
    )
    .unwrap();
    assert_eq!(ir.tasks.len(), 1);
    match &ir.tasks[0].kind {
        TaskKind::Parallel(lp) => assert_eq!(lp.threads, Some(16)),
        other => panic!("expected a parallel task, got {:?}", other),
    }
    let atomics: Vec<&Stmt> = ir
        .statements()
        .into_iter()
        .filter(|s| matches!(s.kind, StmtKind::AtomicOp { .. }))
        .collect();
    assert_eq!(atomics.len(), 1);
    let StmtKind::AtomicOp {
        target: AtomicTarget::Global { ptr, .. },
        value,
        ..
    } = &atomics[0].kind
    else {
        panic!("expected a global atomic");
    };
    assert_eq!(*value, Operand::Const(Literal::I32(1)));
    let ptr_stmt = ir.statements().into_iter().find(|s| s.id == *ptr).unwrap();
    assert!(matches!(
        &ptr_stmt.kind,
        StmtKind::GlobalPtr { indices, .. } if indices == &vec![Operand::Const(Literal::I32(0))]
    ));
}

#[test]
fn test_compound_add_is_atomic() {
    let ir = lower(&scope(), "() => { for (let i of range(8)) { counter[0] += i } }").unwrap();
    assert_eq!(ir.count(|k| matches!(k, StmtKind::AtomicOp { .. })), 1);
    assert_eq!(ir.count(|k| matches!(k, StmtKind::GlobalStore { .. })), 0);
}

#[test]
fn test_vector_shape_mismatch() {
    let err = lower(
        &scope(),
        "() => { let a = [1.0, 2.0]; let b = [1.0, 2.0, 3.0]; let c = a + b }",
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::ShapeMismatch { .. }));
}

#[test]
fn test_task_split_and_shared_slots() {
    let ir = lower(
        &scope(),
        "() => {
            let total = 0
            for (let i of range(8)) { x[i] = i * 2 }
            total = 5
            return total
        }",
    )
    .unwrap();
    let kinds: Vec<bool> = ir.tasks.iter().map(|t| t.is_parallel()).collect();
    assert_eq!(kinds, vec![false, true, false]);
    assert_eq!(ir.global_tmps.len(), 1);
    assert_eq!(ir.ret, Some(I32));
}

#[test]
fn test_ndrange_decomposes_index() {
    let ir = lower(
        &scope(),
        "() => { for (let [i, j] of ndrange(4, 5)) { g[i, j] = i + j } }",
    )
    .unwrap();
    match &ir.tasks[0].kind {
        TaskKind::Parallel(lp) => assert_eq!(lp.threads, Some(20)),
        other => panic!("expected a parallel task, got {:?}", other),
    }
    assert_eq!(binary_ops(&ir, BinOp::Mod).len(), 1);
    assert_eq!(binary_ops(&ir, BinOp::FloorDiv).len(), 1);
}

#[test]
fn test_serial_loop_inside_parallel() {
    let ir = lower(
        &scope(),
        "() => {
            for (let i of range(8)) {
                let acc = 0.0
                for (let k of range(i)) { acc = acc + k }
                x[i] = acc
            }
        }",
    )
    .unwrap();
    assert_eq!(ir.tasks.len(), 1);
    assert_eq!(ir.count(|k| matches!(k, StmtKind::RangeFor { .. })), 1);
    assert!(ir.global_tmps.is_empty());
}

#[test]
fn test_recursion_detected() {
    let err = lower(
        &scope(),
        "() => { function f(n) { return f(n) } let a = f(1) }",
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::RecursionDetected { ref name, .. } if name == "f"));
}

#[test]
fn test_break_rules() {
    let err = lower(&scope(), "() => { for (let i of range(4)) { break } }").unwrap_err();
    assert!(matches!(err, CompileError::InvalidControlFlow { .. }));

    let err = lower(&scope(), "() => { break }").unwrap_err();
    assert!(matches!(err, CompileError::InvalidControlFlow { .. }));

    let ir = lower(
        &scope(),
        "() => { for (let i of range(4)) { if (i > 1) { continue } x[i] = 1.0 } }",
    )
    .unwrap();
    assert_eq!(ir.count(|k| matches!(k, StmtKind::LoopControl(_))), 1);
}

#[test]
fn test_library_out_parameters() {
    let mut scope = scope();
    scope.add_stored("m", field(3, "m", &[1], Type::Matrix(Prim::F32, 2, 2)));
    let ir = lower(
        &scope,
        "() => {
            let A = [[1.0, 2.0], [3.0, 4.0]]
            let U = [[0.0, 0.0], [0.0, 0.0]]
            let P = [[0.0, 0.0], [0.0, 0.0]]
            polarDecompose2D(A, U, P)
            m[0] = U
        }",
    )
    .unwrap();
    assert_eq!(
        ir.count(|k| matches!(k, StmtKind::Call { intrinsic, .. } if intrinsic.name == "sqrt")),
        1
    );
    assert_eq!(binary_ops(&ir, BinOp::MatMul).len(), 1);
    assert_eq!(ir.count(|k| matches!(k, StmtKind::GlobalStore { .. })), 1);
}

#[test]
fn test_template_parameters() {
    let mut templates = HashMap::new();
    templates.insert("k".to_string(), Value::int(3));
    let source = "(k: template) => { for (let i of range(8)) { x[i] = k } }";
    let ir = lower_with(&scope(), source, &templates, &CompilerConfig::default()).unwrap();
    assert!(ir.params.is_empty());
    assert_eq!(
        ir.count(|k| matches!(
            k,
            StmtKind::GlobalStore { value: Operand::Const(Literal::F32(v)), .. } if *v == 3.0
        )),
        1
    );

    let err = lower(&scope(), source).unwrap_err();
    assert!(matches!(err, CompileError::NotConstant { .. }));
}

#[test]
fn test_runtime_parameters_load_args() {
    let ir = lower(&scope(), "(n: i32, s: f32) => { for (let i of range(n)) { x[i] = s } }").unwrap();
    assert_eq!(ir.params.len(), 2);
    match &ir.tasks[0].kind {
        TaskKind::Parallel(lp) => {
            assert_eq!(lp.threads, None);
            assert!(matches!(lp.prologue[0].kind, StmtKind::ArgLoad { index: 0, .. }));
        }
        other => panic!("expected a parallel task, got {:?}", other),
    }
    assert_eq!(
        ir.count(|k| matches!(k, StmtKind::ArgLoad { index: 1, .. })),
        1
    );
}

#[test]
fn test_struct_members_address_offsets() {
    let mut scope = scope();
    let particle = Type::Struct(StructTy::new(vec![
        ("pos".to_string(), Type::Vector(Prim::F32, 3)),
        ("mass".to_string(), F32),
    ]));
    scope.add_stored("particles", field(4, "particles", &[4], particle));
    let ir = lower(
        &scope,
        "() => { for (let i of range(4)) { particles[i].mass = particles[i].pos.y } }",
    )
    .unwrap();
    let offsets: Vec<Operand> = ir
        .statements()
        .into_iter()
        .filter_map(|s| match &s.kind {
            StmtKind::GlobalPtr { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect();
    assert_eq!(
        offsets,
        vec![
            Operand::Const(Literal::I32(1)),
            Operand::Const(Literal::I32(3)),
        ]
    );

    let err = lower(&scope, "() => { let a = particles[0].velocity }").unwrap_err();
    assert!(matches!(err, CompileError::UnknownField { .. }));
}

#[test]
fn test_unresolved_symbol() {
    let err = lower(&scope(), "() => { let a = nope + 1 }").unwrap_err();
    assert!(matches!(err, CompileError::UnresolvedSymbol { ref name, .. } if name == "nope"));
}

#[test]
fn test_conditional_expression_branches() {
    let ir = lower(
        &scope(),
        "() => { for (let i of range(8)) { x[i] = i > 3 ? 1.0 : 2.0 } }",
    )
    .unwrap();
    assert_eq!(ir.count(|k| matches!(k, StmtKind::If { .. })), 1);

    let ir = lower(&scope(), "() => { x[0] = 1 > 3 ? 1.0 : 2.0 }").unwrap();
    assert_eq!(ir.count(|k| matches!(k, StmtKind::If { .. })), 0);
}

#[test]
fn test_referenced_fields_are_recorded() {
    let ir = lower(&scope(), "() => { for (let i of range(8)) { x[i] = g[0, 1] } }").unwrap();
    let names: Vec<&str> = ir.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["x", "g"]);
    assert!(ir.field(FieldId(1)).is_none());
    assert!(ir.textures.is_empty());
}
