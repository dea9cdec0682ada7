use std::path::Path;
use std::process::{Command, Output};

const KERNEL: &str = "(a: i32) => {
    for (let i of range(4)) { counts[i] = a }
    return a
}
";

const SCOPE: &str = r#"
[fields.counts]
elem = "i32"
shape = [4]
init = 7
"#;

fn tessera(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tessera"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("run tessera")
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("fill.ts"), KERNEL).expect("write kernel");
    std::fs::write(dir.path().join("scope.toml"), SCOPE).expect("write scope");
    dir
}

#[test]
fn test_build_prints_shaders() {
    let dir = workspace();
    let out = tessera(&["build", "fill.ts", "--scope", "scope.toml"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("@compute"));
    assert!(stdout.contains("// task 0"));
}

#[test]
fn test_build_writes_one_file_per_task() {
    let dir = workspace();
    let out = tessera(
        &["build", "fill.ts", "--scope", "scope.toml", "--out", "shaders"],
        dir.path(),
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let mut files: Vec<String> = std::fs::read_dir(dir.path().join("shaders"))
        .expect("read out dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with("fill.0."));
    assert!(files.iter().all(|f| f.ends_with(".wgsl")));
}

#[test]
fn test_build_reports_compile_errors() {
    let dir = workspace();
    let out = tessera(&["build", "fill.ts"], dir.path());
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("could not compile"));
}

#[test]
fn test_reflect_lists_bindings() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("k.wgsl"),
        "@group(0) @binding(0) var<storage, read_write> field_0_x: array<i32>;
@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    field_0_x[gid.x] = 1;
}
",
    )
    .expect("write shader");
    let out = tessera(&["reflect", "k.wgsl"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("compute"));
    assert!(stdout.contains("field_0_x"));
}

#[test]
fn test_run_headless_reads_fields() {
    let dir = workspace();
    let out = tessera(
        &[
            "run", "fill.ts", "--scope", "scope.toml", "--arg", "3", "--read", "counts",
            "--headless",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("0i"));
    assert!(stdout.contains("counts = [7i, 7i, 7i, 7i]"));
}

#[test]
fn test_run_rejects_missing_argument() {
    let dir = workspace();
    let out = tessera(
        &["run", "fill.ts", "--scope", "scope.toml", "--headless"],
        dir.path(),
    );
    assert!(!out.status.success());
}
