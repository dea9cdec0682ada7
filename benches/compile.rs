//! Compile-pipeline latency: parse + lower + codegen + reflection.
//!
//! Kernels are sized like typical simulation steps: a few parallel loops
//! with vector math and a reduction through shared temporaries.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tessera::compile::compile_kernel;
use tessera::config::CompilerConfig;
use tessera::reflect::reflect;
use tessera::scope::{FieldId, FieldInfo, Scope, Value};
use tessera::types::{Prim, Type, F32};

const PARTICLES: &str = "(dt: f32) => {
    for (let i of range(4096)) {
        let v = vel[i] + [0.0, -9.8] * dt
        let p = pos[i] + v * dt
        if (p.y < 0.0) { v.y = -v.y * 0.5; p.y = 0.0 }
        vel[i] = v
        pos[i] = p
    }
}";

const REDUCE: &str = "() => {
    let total = 0.0
    for (let [i, j] of ndrange(64, 64)) { total += grid[i, j] * grid[i, j] }
    return sqrt(total)
}";

fn scope() -> Scope {
    let vec2 = Type::Vector(Prim::F32, 2);
    let field = |id, name: &str, shape: Vec<usize>, elem| {
        Value::Field(Arc::new(FieldInfo {
            id: FieldId(id),
            name: name.to_string(),
            shape,
            elem,
        }))
    };
    let mut scope = Scope::new();
    scope.add_stored("pos", field(0, "pos", vec![4096], vec2.clone()));
    scope.add_stored("vel", field(1, "vel", vec![4096], vec2));
    scope.add_stored("grid", field(2, "grid", vec![64, 64], F32));
    scope
}

/// Benchmark: full kernel compile.
fn bench_compile(c: &mut Criterion) {
    let scope = scope();
    let config = CompilerConfig::default();

    let mut group = c.benchmark_group("compile");
    group.bench_function("particles", |b| {
        b.iter(|| compile_kernel(&scope, black_box(PARTICLES), &config))
    });
    group.bench_function("reduce", |b| {
        b.iter(|| compile_kernel(&scope, black_box(REDUCE), &config))
    });
    group.finish();
}

/// Benchmark: binding reflection over generated shader text.
fn bench_reflect(c: &mut Criterion) {
    let kernel = match compile_kernel(&scope(), PARTICLES, &CompilerConfig::default()) {
        Ok(kernel) => kernel,
        Err(e) => panic!("benchmark kernel does not compile: {}", e),
    };
    let wgsl = kernel.tasks[0].wgsl.clone();
    c.bench_function("reflect", |b| b.iter(|| reflect(black_box(&wgsl))));
}

criterion_group!(benches, bench_compile, bench_reflect);
criterion_main!(benches);
