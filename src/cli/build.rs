use std::path::PathBuf;
use std::process;

use clap::Args;

use tessera::compile::compile_kernel;
use tessera::scope::StaticRegistry;

use super::{exit_with_compile_error, load_config, load_manifest, read_source, stem};

#[derive(Args)]
pub struct BuildArgs {
    /// Kernel source file
    pub input: PathBuf,
    /// Scope manifest declaring fields, textures, constants and functions
    #[arg(long, value_name = "FILE")]
    pub scope: Option<PathBuf>,
    /// Write one .wgsl file per task into this directory (default: stdout)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,
    /// Print the kernel IR before the shaders
    #[arg(long)]
    pub ir: bool,
}

pub fn cmd_build(args: BuildArgs) {
    let config = load_config(&args.input);
    let source = read_source(&args.input);
    let manifest = load_manifest(args.scope.as_deref());
    let scope = match manifest.build(&mut StaticRegistry::default()) {
        Ok(scope) => scope,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let kernel = match compile_kernel(&scope, &source, &config.compiler) {
        Ok(kernel) => kernel,
        Err(e) => exit_with_compile_error(&e, &args.input, &source),
    };

    if args.ir {
        println!("{}", kernel.ir);
    }

    let Some(out_dir) = args.out else {
        print!("{}", kernel);
        return;
    };
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!("error: cannot create '{}': {}", out_dir.display(), e);
        process::exit(1);
    }
    let name = stem(&args.input);
    for (i, task) in kernel.tasks.iter().enumerate() {
        let path = out_dir.join(format!("{}.{}.{}.wgsl", name, i, task.fingerprint));
        if let Err(e) = std::fs::write(&path, &task.wgsl) {
            eprintln!("error: cannot write '{}': {}", path.display(), e);
            process::exit(1);
        }
        eprintln!(
            "  {} ({}, {} workgroup(s) of {})",
            path.display(),
            if task.parallel { "parallel" } else { "serial" },
            task.workgroups,
            task.workgroup_size
        );
    }
    eprintln!(
        "Compiled {} -> {} task(s) in {}",
        args.input.display(),
        kernel.tasks.len(),
        out_dir.display()
    );
}
