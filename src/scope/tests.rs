use super::*;

fn sample() -> Scope {
    let mut scope = Scope::new();
    scope.add_stored("n", Value::int(16));
    scope.add_stored(
        "params",
        Value::record(vec![
            ("dt", Value::float(0.01)),
            ("gravity", Value::record(vec![("y", Value::float(-9.8))])),
        ]),
    );
    scope
}

#[test]
fn test_add_and_get() {
    let scope = sample();
    assert!(scope.has_stored("n"));
    assert!(!scope.has_stored("m"));
    assert_eq!(scope.get_stored("n"), Some(&Value::int(16)));
    assert_eq!(scope.get_stored("m"), None);
    assert_eq!(scope.names(), vec!["n", "params"]);
}

#[test]
fn test_clone_is_independent() {
    let original = sample();
    let mut copy = original.clone();
    copy.add_stored("n", Value::int(32));
    copy.add_stored("extra", Value::int(1));
    copy.clear_stored();
    assert!(copy.is_empty());
    assert_eq!(original.get_stored("n"), Some(&Value::int(16)));
    assert!(!original.has_stored("extra"));
}

#[test]
fn test_merge_prefers_right() {
    let mut a = Scope::new();
    a.add_stored("x", Value::int(1));
    a.add_stored("y", Value::int(2));
    let mut b = Scope::new();
    b.add_stored("y", Value::float(3.0));
    b.add_stored("z", Value::int(4));
    let merged = Scope::merge(&a, &b);
    for key in ["x", "y", "z"] {
        let expected = if b.has_stored(key) {
            b.get_stored(key)
        } else {
            a.get_stored(key)
        };
        assert_eq!(merged.get_stored(key), expected);
    }
    assert_eq!(merged.len(), 3);
}

#[test]
fn test_try_evaluate_paths() {
    let scope = sample();
    assert_eq!(scope.try_evaluate("params.dt"), Some(&Value::float(0.01)));
    assert_eq!(
        scope.try_evaluate("params.gravity.y"),
        Some(&Value::float(-9.8))
    );
    assert!(scope.can_evaluate("params.gravity"));
    assert_eq!(scope.try_evaluate("params.missing"), None);
    // non-record intermediate
    assert_eq!(scope.try_evaluate("n.x"), None);
    assert_eq!(scope.try_evaluate("nothing.at.all"), None);
}

#[test]
fn test_receiver() {
    let scope = sample().with_receiver(Value::record(vec![("mass", Value::float(2.0))]));
    assert_eq!(scope.try_evaluate("this.mass"), Some(&Value::float(2.0)));
    assert_eq!(Scope::new().try_evaluate("this.mass"), None);
}

#[test]
fn test_globals_drops_lowering_bindings() {
    let mut scope = sample();
    scope.add_stored("i", Value::Arg { index: 0, ty: crate::types::I32 });
    let globals = scope.globals();
    assert!(globals.has_stored("n"));
    assert!(!globals.has_stored("i"));
}

#[test]
fn test_field_strides() {
    let info = FieldInfo {
        id: FieldId(0),
        name: "grid".into(),
        shape: vec![4, 5, 6],
        elem: Type::Vector(Prim::F32, 2),
    };
    assert_eq!(info.strides(), vec![30, 6, 1]);
    assert_eq!(info.len(), 120);
    assert_eq!(info.words(), 240);
    assert_eq!(info.size_bytes(), 960);
}

#[test]
fn test_matrix_value() {
    let m = Value::matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let Value::NumberArray { values, ty } = m else {
        panic!("expected number array");
    };
    assert_eq!(ty, Type::Matrix(Prim::F32, 2, 2));
    assert_eq!(values[1], Literal::F32(2.0));
    assert!(Value::matrix(&[vec![1.0, 2.0], vec![3.0]]).is_err());
}

const MANIFEST: &str = r#"
[constants]
n = 128
dt = 0.5
gravity = [0, -9.8]
rot = [[1.0, 0.0], [0.0, 1.0]]
params = { substeps = 4 }

[fields.x]
elem = "vec2f"
shape = [128]

[fields.particles]
members = ["pos: vec3f", "mass: f32"]
shape = [8, 8]

[textures.image]
dims = [64, 64]
storage = true

[functions]
sq = "(x) => x * x"
"#;

#[test]
fn test_manifest_builds_scope() {
    let manifest = ScopeManifest::parse(MANIFEST).unwrap();
    let scope = manifest.build(&mut StaticRegistry::default()).unwrap();
    assert_eq!(scope.get_stored("n"), Some(&Value::int(128)));
    assert_eq!(scope.get_stored("dt"), Some(&Value::float(0.5)));
    assert_eq!(
        scope.get_stored("gravity"),
        Some(&Value::NumberArray {
            values: vec![Literal::F32(0.0), Literal::F32(-9.8)],
            ty: Type::Vector(Prim::F32, 2),
        })
    );
    assert_eq!(scope.try_evaluate("params.substeps"), Some(&Value::int(4)));

    let fields = scope.fields();
    assert_eq!(fields.len(), 2);
    // BTreeMap order: particles before x
    assert_eq!(fields[0].name, "particles");
    assert_eq!(fields[0].elem.component_count(), 4);
    assert_eq!(fields[1].elem, Type::Vector(Prim::F32, 2));

    match scope.get_stored("image") {
        Some(Value::Texture(tex)) => {
            assert!(tex.storage);
            assert_eq!(tex.format, TexelFormat::Rgba8Unorm);
        }
        other => panic!("expected texture, got {:?}", other),
    }
    assert!(matches!(scope.get_stored("sq"), Some(Value::Function(_))));
}

#[test]
fn test_manifest_rejects_bad_declarations() {
    let bad_elem = "[fields.x]\nelem = \"vec9f\"\nshape = [4]\n";
    let err = ScopeManifest::parse(bad_elem)
        .unwrap()
        .build(&mut StaticRegistry::default())
        .unwrap_err();
    assert!(matches!(err, ManifestError::Field { .. }));

    let bad_fn = "[functions]\nf = \"let x = 1\"\n";
    let err = ScopeManifest::parse(bad_fn)
        .unwrap()
        .build(&mut StaticRegistry::default())
        .unwrap_err();
    assert!(matches!(err, ManifestError::Function { .. }));

    assert!(ScopeManifest::parse("[unknown]\n").is_err());
}
