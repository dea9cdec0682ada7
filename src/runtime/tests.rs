use super::*;
use crate::scope::ScopeManifest;
use crate::types::{F32, I32};

const VERTEX: &str = "@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(f32(i), 0.0, 0.0, 1.0);
}
";

const FRAGMENT: &str = "@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
";

fn runtime() -> Runtime<HeadlessDevice> {
    Runtime::headless(Config::default())
}

fn scope_with(runtime: &Runtime<HeadlessDevice>) -> (Scope, Arc<FieldInfo>) {
    let x = runtime.field("x", &[256], F32).unwrap();
    let mut scope = Scope::new();
    scope.add_stored("x", Value::Field(x.clone()));
    (scope, x)
}

#[test]
fn test_pool_reuses_returned_buffer() {
    let device = HeadlessDevice::new();
    let mut pool: BufferPool<HeadlessDevice> = BufferPool::new(ARGS_USAGE);
    let first = pool.get_buffer(&device, 64);
    let handle = first.buffer.clone();
    pool.return_buffer(first);

    let again = pool.get_buffer(&device, 64);
    assert!(Shared::ptr_eq(&again.buffer, &handle));
    assert_eq!(pool.allocations(), 1);
    pool.return_buffer(again);

    let smaller = pool.get_buffer(&device, 16);
    assert_eq!(smaller.capacity, 64);
    assert_eq!(pool.allocations(), 1);

    let larger = pool.get_buffer(&device, 128);
    assert_eq!(larger.capacity, 128);
    assert_eq!(pool.allocations(), 2);
    assert_eq!(device.stats().buffers, 2);
}

#[test]
fn test_pool_is_first_fit() {
    let device = HeadlessDevice::new();
    let mut pool: BufferPool<HeadlessDevice> = BufferPool::new(ARGS_USAGE);
    let big = pool.get_buffer(&device, 1024);
    let small = pool.get_buffer(&device, 32);
    pool.return_buffer(big);
    pool.return_buffer(small);
    assert_eq!(pool.get_buffer(&device, 16).capacity, 1024);
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn test_shader_module_keyed_by_source() {
    let device = HeadlessDevice::new();
    let mut cache: PipelineCache<HeadlessDevice> = PipelineCache::new();
    let a = cache.get_or_create_shader_module(&device, VERTEX).unwrap();
    let b = cache
        .get_or_create_shader_module(&device, &VERTEX.to_string())
        .unwrap();
    assert!(Shared::ptr_eq(&a, &b));
    let c = cache.get_or_create_shader_module(&device, FRAGMENT).unwrap();
    assert!(!Shared::ptr_eq(&a, &c));
    assert_eq!(device.stats().shader_modules, 2);
    assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
}

#[test]
fn test_equal_descriptors_share_pipeline() {
    let device = HeadlessDevice::new();
    let mut cache: PipelineCache<HeadlessDevice> = PipelineCache::new();
    let code = "@compute @workgroup_size(1) fn main() {}";
    let module = cache.get_or_create_shader_module(&device, code).unwrap();
    let desc_a = ComputePipelineDesc {
        label: Some("k".to_string()),
        module: module.clone(),
        entry_point: "main".to_string(),
    };
    let desc_b = ComputePipelineDesc {
        label: Some("k".to_string()),
        module,
        entry_point: "main".to_string(),
    };
    let a = cache.get_or_create_compute_pipeline(&device, &desc_a).unwrap();
    let b = cache.get_or_create_compute_pipeline(&device, &desc_b).unwrap();
    assert!(Shared::ptr_eq(&a, &b));
    assert_eq!(device.stats().compute_pipelines, 1);
}

#[test]
fn test_render_pipeline_cache() {
    let device = HeadlessDevice::new();
    let mut cache: PipelineCache<HeadlessDevice> = PipelineCache::new();
    let vs = cache.get_or_create_shader_module(&device, VERTEX).unwrap();
    let fs = cache.get_or_create_shader_module(&device, FRAGMENT).unwrap();
    let desc = |topology| RenderPipelineDesc {
        label: None,
        vertex: vs.clone(),
        vertex_entry: "vs_main".to_string(),
        vertex_buffers: vec![device::VertexLayout {
            stride: 16,
            attributes: vec![device::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: 0,
                location: 0,
            }],
        }],
        fragment: Some((fs.clone(), "fs_main".to_string())),
        color_targets: vec![wgpu::TextureFormat::Rgba8Unorm],
        topology,
        depth_format: None,
    };
    let a = cache
        .get_or_create_render_pipeline(&device, &desc(wgpu::PrimitiveTopology::TriangleList))
        .unwrap();
    let b = cache
        .get_or_create_render_pipeline(&device, &desc(wgpu::PrimitiveTopology::TriangleList))
        .unwrap();
    let c = cache
        .get_or_create_render_pipeline(&device, &desc(wgpu::PrimitiveTopology::LineList))
        .unwrap();
    assert!(Shared::ptr_eq(&a, &b));
    assert!(!Shared::ptr_eq(&a, &c));
    assert_eq!(device.stats().render_pipelines, 2);
}

#[test]
fn test_pipeline_entry_point_mismatch() {
    let device = HeadlessDevice::new();
    let mut cache: PipelineCache<HeadlessDevice> = PipelineCache::new();
    let module = cache.get_or_create_shader_module(&device, VERTEX).unwrap();
    let desc = ComputePipelineDesc {
        label: None,
        module,
        entry_point: "vs_main".to_string(),
    };
    let err = cache
        .get_or_create_compute_pipeline(&device, &desc)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Pipeline { .. }));
}

#[test]
fn test_kernel_compiled_twice_reuses_pipelines() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let source = "() => { for (let i of range(256)) { x[i] = i } }";
    let a = rt.kernel(&scope, source).unwrap();
    let b = rt.kernel(&scope, source).unwrap();
    assert_eq!(a.pipelines().len(), 1);
    assert!(Shared::ptr_eq(&a.pipelines()[0], &b.pipelines()[0]));
    assert_eq!(rt.device().stats().compute_pipelines, 1);
    assert_eq!(rt.cache_stats().hits, 2);
}

#[test]
fn test_launch_encodes_all_tasks_in_one_submission() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let kernel = rt
        .kernel(
            &scope,
            "(s: f32) => {
                let total = 0.0
                for (let i of range(256)) { x[i] = s; total += s }
                return total
            }",
        )
        .unwrap();
    assert_eq!(kernel.compiled.tasks.len(), 3);

    let result = rt.launch(&kernel, &[Value::float(2.0)]).unwrap().wait().unwrap();
    assert_eq!(result, vec![Literal::F32(0.0)]);

    let stats = rt.device().stats();
    assert_eq!(stats.submissions, 1);
    let dispatches = rt.device().dispatches();
    assert_eq!(dispatches.len(), 3);
    assert_eq!(dispatches[0].workgroups, [1, 1, 1]);
    assert_eq!(dispatches[1].workgroups, [2, 1, 1]);
}

#[test]
fn test_dispatch_binds_every_task_resource() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let kernel = rt
        .kernel(&scope, "(s: f32) => { for (let i of range(256)) { x[i] = s } }")
        .unwrap();
    let expected = kernel.compiled.tasks[0].bindings.len();
    assert_eq!(expected, 2);
    rt.launch(&kernel, &[Value::float(3.0)]).unwrap().wait().unwrap();
    let dispatches = rt.device().dispatches();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].bindings, expected);
    assert_eq!(rt.pool_allocations(ARGS_USAGE), 1);
}

#[test]
fn test_launch_buffers_are_recycled() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let kernel = rt
        .kernel(&scope, "(s: f32) => { x[0] = s; return s }")
        .unwrap();
    for _ in 0..3 {
        rt.launch(&kernel, &[Value::float(1.0)]).unwrap().wait().unwrap();
    }
    assert_eq!(rt.pool_allocations(ARGS_USAGE), 1);
    assert_eq!(rt.pool_allocations(RETS_USAGE), 1);
    assert_eq!(rt.pool_allocations(STAGING_USAGE), 1);
}

#[test]
fn test_dropped_launch_returns_buffers_to_pool() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let kernel = rt
        .kernel(&scope, "(s: f32) => { x[0] = s; return s }")
        .unwrap();
    drop(rt.launch(&kernel, &[Value::float(1.0)]).unwrap());
    let ret = rt.launch(&kernel, &[Value::float(2.0)]).unwrap().wait().unwrap();
    assert_eq!(ret.len(), 1);
    assert_eq!(rt.device().stats().submissions, 2);
    assert_eq!(rt.pool_allocations(ARGS_USAGE), 1);
    assert_eq!(rt.pool_allocations(RETS_USAGE), 1);
    assert_eq!(rt.pool_allocations(STAGING_USAGE), 1);
}

#[test]
fn test_argument_checks() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let kernel = rt.kernel(&scope, "(a: i32, b: vec2f) => { x[a] = b.x }").unwrap();

    let err = rt.launch(&kernel, &[Value::int(1)]).err().unwrap();
    assert!(matches!(err, RuntimeError::ArgumentCount { expected: 2, found: 1, .. }));

    let err = rt
        .launch(&kernel, &[Value::int(1), Value::float(1.0)])
        .err()
        .unwrap();
    assert!(matches!(err, RuntimeError::ArgumentType { .. }));

    let b = Value::vector(&[1.0, 2.0]).unwrap();
    assert!(rt.launch(&kernel, &[Value::int(1), b]).is_ok());
}

#[test]
fn test_field_round_trip() {
    let rt = runtime();
    let (_, x) = scope_with(&rt);
    let data: Vec<f32> = (0..256).map(|i| i as f32 * 0.5).collect();
    rt.write_field(&x, &data).unwrap();
    assert_eq!(rt.read_field::<f32>(&x).unwrap(), data);

    let err = rt.write_field(&x, &[1.0f32; 3]).unwrap_err();
    assert!(matches!(err, RuntimeError::SizeMismatch { expected: 1024, found: 12, .. }));
}

#[test]
fn test_manifest_builds_resources_on_runtime() {
    let mut rt = runtime();
    let manifest = ScopeManifest::parse(
        r#"
        [fields.counts]
        elem = "i32"
        shape = [4]
        init = 7

        [textures.image]
        dims = [8, 8]
        storage = true
        "#,
    )
    .unwrap();
    let scope = manifest.build(&mut rt).unwrap();
    let Some(Value::Field(counts)) = scope.get_stored("counts") else {
        panic!("expected a field");
    };
    assert_eq!(counts.elem, I32);
    assert_eq!(rt.read_field::<i32>(counts).unwrap(), vec![7; 4]);
    assert_eq!(rt.device().stats().textures, 1);
    assert_eq!(rt.device().stats().samplers, 1);
}

#[test]
fn test_template_instances_cached_per_binding() {
    let rt = runtime();
    let (scope, _) = scope_with(&rt);
    let kernel = rt.template_kernel(&scope, "(k: template) => { for (let i of range(8)) { x[i] = k } }");

    let bind = |v| HashMap::from([("k".to_string(), Value::int(v))]);
    let a = rt.instantiate(&kernel, &bind(1)).unwrap();
    let b = rt.instantiate(&kernel, &bind(1)).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    rt.instantiate(&kernel, &bind(2)).unwrap();
    assert_eq!(kernel.instance_count(), 2);
    assert_eq!(rt.device().stats().compute_pipelines, 2);
}

#[test]
fn test_unknown_field_is_rejected_at_launch() {
    let rt = runtime();
    let mut scope = Scope::new();
    scope.add_stored(
        "ghost",
        Value::Field(Arc::new(FieldInfo {
            id: FieldId(9),
            name: "ghost".to_string(),
            shape: vec![4],
            elem: F32,
        })),
    );
    let kernel = rt.kernel(&scope, "() => { ghost[0] = 1.0 }").unwrap();
    let err = rt.launch(&kernel, &[]).err().unwrap();
    assert!(matches!(err, RuntimeError::UnknownResource(name) if name == "ghost"));
    assert_eq!(rt.device().stats().submissions, 0);
}

#[test]
fn test_random_seed_word_appended() {
    let config = Config {
        runtime: crate::config::RuntimeConfig {
            seed: Some(41),
            ..Default::default()
        },
        ..Default::default()
    };
    let rt = Runtime::headless(config);
    let (scope, _) = scope_with(&rt);
    let kernel = rt
        .kernel(&scope, "(s: f32) => { for (let i of range(4)) { x[i] = random() * s } }")
        .unwrap();
    assert_eq!(kernel.compiled.arg_words(), 2);
    let words = rt.encode_args(&kernel.compiled, &[Value::float(1.0)]).unwrap();
    assert_eq!(words, vec![1.0f32.to_bits(), 41]);
}
