pub mod build;
pub mod reflect;
pub mod run;

use std::path::Path;
use std::process;

use tessera::config::Config;
use tessera::diagnostic::render_diagnostics;
use tessera::error::CompileError;
use tessera::scope::ScopeManifest;

/// Read a source file or exit.
pub fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Load `tessera.toml` from the input's directory upward, with env overrides.
pub fn load_config(input: &Path) -> Config {
    match Config::discover(input) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Load a scope manifest, or an empty one when no path is given.
pub fn load_manifest(path: Option<&Path>) -> ScopeManifest {
    let Some(path) = path else {
        return ScopeManifest::default();
    };
    match ScopeManifest::load(path) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Render a compile error against its source and exit.
pub fn exit_with_compile_error(err: &CompileError, path: &Path, source: &str) -> ! {
    render_diagnostics(&err.to_diagnostics(), &path.display().to_string(), source);
    eprintln!("error: could not compile '{}'", path.display());
    process::exit(1);
}

/// File stem used to name outputs.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("kernel")
        .to_string()
}
