use std::collections::HashMap;
use std::sync::Arc;

use super::*;
use crate::ir::{Literal, Operand, Stmt};
use crate::lower::{lower_kernel, KERNEL_FILE};
use crate::reflect::{reflect, ShaderStage};
use crate::scope::{FieldInfo, Scope, TexelFormat, TextureInfo, Value};
use crate::syntax::parse_function;
use crate::types::{Prim, F32, I32};

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
    scope.add_stored("x", field(0, "x", &[1000], F32));
    scope.add_stored("counter", field(1, "counter", &[1], I32));
    scope.add_stored("g", field(2, "g", &[4, 5], I32));
    scope.add_stored("y", field(3, "y", &[1000], F32));
    scope.add_stored("m", field(4, "m", &[2], Type::Matrix(Prim::F32, 2, 2)));
    scope
}

fn shaders_with(scope: &Scope, source: &str, config: &CompilerConfig) -> Vec<TaskShader> {
    let decl = parse_function(source, KERNEL_FILE).unwrap();
    let ir = lower_kernel(&decl, scope, &HashMap::new(), config).unwrap();
    generate(&ir, config)
}

fn shaders(source: &str) -> Vec<TaskShader> {
    shaders_with(&scope(), source, &CompilerConfig::default())
}

#[test]
fn test_parallel_loop_dispatch_shape() {
    let out = shaders("() => { for (let i of range(1000)) { x[i] = i * 2.0 } }");
    assert_eq!(out.len(), 1);
    let shader = &out[0];
    assert!(shader.parallel);
    assert_eq!(shader.threads, 1000);
    assert_eq!(shader.workgroup_size, 128);
    assert_eq!(shader.workgroups, 8);
    assert!(shader.wgsl.contains("@compute @workgroup_size(128)"));
    assert!(shader.wgsl.contains("+ i32(gid.x);"));
    assert!(shader.wgsl.contains("_i + 1024i)"));
    assert!(shader
        .wgsl
        .contains("@group(0) @binding(0) var<storage, read_write> field_0_x: array<i32>;"));
    assert!(shader.wgsl.contains("= bitcast<i32>("));
}

#[test]
fn test_serial_task_shape() {
    let out = shaders("() => { x[0] = 1.0 }");
    assert_eq!(out.len(), 1);
    assert!(!out[0].parallel);
    assert_eq!(out[0].workgroups, 1);
    assert!(out[0].wgsl.contains("@compute @workgroup_size(1)"));
    assert!(out[0].wgsl.contains("field_0_x[0] = bitcast<i32>(1.0f);"));
}

#[test]
fn test_bindings_in_first_reference_order() {
    let out = shaders("() => { for (let i of range(8)) { x[i] = y[i] } }");
    let names: Vec<(&str, Access)> = out[0]
        .bindings
        .iter()
        .map(|b| (b.name.as_str(), b.access))
        .collect();
    assert_eq!(
        names,
        vec![("field_3_y", Access::Read), ("field_0_x", Access::ReadWrite)]
    );
    assert!(out[0].wgsl.contains("var<storage, read> field_3_y: array<i32>;"));
}

#[test]
fn test_global_load_and_store_go_through_the_pointer() {
    let out = shaders("() => { for (let i of range(8)) { y[i] = x[i + 1] } }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("bitcast<f32>(field_0_x["));
    assert!(wgsl.contains("field_3_y[_"));
    assert!(!wgsl.contains("= 0.0f;"));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "unregistered pointer")]
fn test_store_through_unregistered_pointer_asserts() {
    let ir = KernelIr {
        name: "dangling".to_string(),
        params: Vec::new(),
        ret: None,
        tasks: vec![Task {
            kind: TaskKind::Serial,
            body: vec![Stmt {
                id: StmtId(1),
                kind: StmtKind::GlobalStore {
                    ptr: StmtId(0),
                    value: Operand::Const(Literal::F32(1.0)),
                },
            }],
        }],
        global_tmps: Vec::new(),
        fields: Vec::new(),
        textures: Vec::new(),
    };
    generate(&ir, &CompilerConfig::default());
}

#[test]
fn test_atomic_field_declared_atomic() {
    let out = shaders("() => { for (let i of range(16)) { atomicAdd(counter[0], 1) } }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("field_1_counter: array<atomic<i32>>;"));
    assert!(wgsl.contains("atomicAdd(&field_1_counter[0], 1i)"));
}

#[test]
fn test_float_atomic_uses_compare_exchange() {
    let out = shaders("() => { for (let i of range(16)) { atomicAdd(x[0], 0.5) } }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("field_0_x: array<atomic<i32>>;"));
    assert!(wgsl.contains("atomicCompareExchangeWeak(&field_0_x[0]"));
    assert!(wgsl.contains("(bitcast<f32>("));
}

#[test]
fn test_static_loop_leaves_no_loop() {
    let out = shaders("() => { for (let i of ti.static(range(3))) { x[i] = 1.0 } }");
    assert!(!out[0].wgsl.contains("for ("));
    assert!(out[0].wgsl.contains("field_0_x[2] = bitcast<i32>(1.0f);"));
}

#[test]
fn test_while_loop_rechecks_condition() {
    let out = shaders(
        "() => {
            let k = 0
            while (k < 10) { k = k + 1 }
            counter[0] = k
        }",
    );
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("loop {"));
    assert!(wgsl.contains("{ break; }"));
    assert!(wgsl.contains("var _"));
}

#[test]
fn test_two_dimensional_address() {
    let out = shaders("() => { for (let [i, j] of ndrange(4, 5)) { g[i, j] = i + j } }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains(" * 5 + "));
    assert!(wgsl.contains("floor_div_i32("));
    assert!(wgsl.contains("fn floor_div_i32(a: i32, b: i32) -> i32"));
}

#[test]
fn test_shared_locals_use_temporaries() {
    let out = shaders(
        "() => {
            let total = 0
            for (let i of range(8)) { total += i }
            return total
        }",
    );
    assert_eq!(out.len(), 3);
    assert!(out[0].wgsl.contains("atomicStore(&global_tmps[0], 0i);"));
    assert!(out[1].wgsl.contains("atomicAdd(&global_tmps[0], "));
    assert!(out[2].wgsl.contains("atomicLoad(&global_tmps[0])"));
    assert!(out[2].wgsl.contains("rets[0] = "));
    for shader in &out {
        assert!(shader
            .bindings
            .iter()
            .any(|b| b.kind == ResourceKind::GlobalTmps));
    }
}

#[test]
fn test_matrix_compose_is_column_major() {
    let out = shaders("() => { m[0] = [[1.0, 2.0], [3.0, 4.0]] }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("mat2x2<f32>(1.0f, 3.0f, 2.0f, 4.0f)"));
    assert!(wgsl.contains("field_4_m[1] = bitcast<i32>(_"));
    assert!(wgsl.contains("[1][0]);"));
}

#[test]
fn test_matrix_negation_and_row_access() {
    let out = shaders("() => { let a = m[0]; let b = -a; m[1] = b; let r = b[1]; x[0] = r.x }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("mat2x2<f32>(-"));
    assert!(wgsl.contains("vec2<f32>("));
    assert!(wgsl.contains("[0][1], "));
    assert!(wgsl.contains("[1][1])"));
}

#[test]
fn test_random_seeds_from_args() {
    let out = shaders("(s: f32) => { for (let i of range(8)) { x[i] = random() * s } }");
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("rng_seed(gid.x, bitcast<u32>(args[1]) ^ 0u);"));
    assert!(wgsl.contains("fn rng_next() -> f32"));
    assert!(wgsl.contains("bitcast<f32>(args[0])"));
    assert_eq!(out[0].bindings[0].kind, ResourceKind::Args);
}

#[test]
fn test_dynamic_bounds_use_configured_threads() {
    let config = CompilerConfig {
        dynamic_threads: 4096,
        workgroup_size: 64,
        ..CompilerConfig::default()
    };
    let out = shaders_with(
        &scope(),
        "(n: i32) => { for (let i of range(n)) { x[i] = 0.0 } }",
        &config,
    );
    assert_eq!(out[0].threads, 4096);
    assert_eq!(out[0].workgroups, 64);
    assert!(out[0].wgsl.contains("< _"));
}

#[test]
fn test_texture_bindings() {
    let mut scope = scope();
    let texture = |id, storage| {
        Value::Texture(Arc::new(TextureInfo {
            id: crate::scope::TextureId(id),
            name: format!("t{}", id),
            dims: vec![16, 16],
            format: TexelFormat::Rgba8Unorm,
            storage,
        }))
    };
    scope.add_stored("src", texture(0, false));
    scope.add_stored("dst", texture(1, true));
    let out = shaders_with(
        &scope,
        "() => { for (let [i, j] of ndrange(16, 16)) {
            let c = textureSample(src, [i / 16.0, j / 16.0])
            textureStore(dst, [i, j], c)
        } }",
        &CompilerConfig::default(),
    );
    let wgsl = &out[0].wgsl;
    assert!(wgsl.contains("var tex_0: texture_2d<f32>;"));
    assert!(wgsl.contains("var sampler_0: sampler;"));
    assert!(wgsl.contains("var storage_tex_1: texture_storage_2d<rgba8unorm, write>;"));
    assert!(wgsl.contains("textureSampleLevel(tex_0, sampler_0, "));
    assert!(wgsl.contains("textureStore(storage_tex_1, "));
}

#[test]
fn test_output_is_deterministic() {
    let source = "() => {
        let total = 0.0
        for (let [i, j] of ndrange(4, 5)) { g[i, j] = i * j }
        for (let i of range(8)) { x[i] = y[i] + 1.0 }
        return total
    }";
    assert_eq!(shaders(source), shaders(source));
}

#[test]
fn test_reflection_round_trips_bindings() {
    let source = "() => {
        let total = 0
        for (let i of range(8)) { x[i] = y[i]; atomicAdd(counter[0], 1); total += 1 }
        return total
    }";
    for shader in shaders(source) {
        let reflected = reflect(&shader.wgsl).unwrap();
        assert_eq!(reflected.stage, ShaderStage::Compute);
        assert_eq!(reflected.entry_point, "main");
        assert_eq!(reflected.workgroup_size, Some([shader.workgroup_size, 1, 1]));
        assert_eq!(reflected.bindings, shader.bindings);
    }
}

#[test]
fn test_workgroup_count_limits() {
    assert_eq!(workgroup_count(0, 128), 1);
    assert_eq!(workgroup_count(129, 128), 2);
    assert_eq!(workgroup_count(u32::MAX, 1), MAX_WORKGROUPS);
}
