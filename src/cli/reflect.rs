use std::path::PathBuf;
use std::process;

use clap::Args;

use tessera::reflect::reflect;

use super::read_source;

#[derive(Args)]
pub struct ReflectArgs {
    /// WGSL shader file
    pub input: PathBuf,
}

pub fn cmd_reflect(args: ReflectArgs) {
    let source = read_source(&args.input);
    let reflection = match reflect(&source) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {}: {}", args.input.display(), e);
            process::exit(1);
        }
    };

    print!("{} entry `{}`", reflection.stage, reflection.entry_point);
    match reflection.workgroup_size {
        Some([x, y, z]) => println!(" @workgroup_size({}, {}, {})", x, y, z),
        None => println!(),
    }
    if reflection.bindings.is_empty() {
        println!("  (no bindings)");
    }
    for b in &reflection.bindings {
        println!(
            "  @group({}) @binding({}) {:<20} {:<12} {}",
            b.group,
            b.binding,
            b.name,
            b.access.wgsl(),
            b.kind
        );
    }
}
