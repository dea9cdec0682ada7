mod cli;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::build::{cmd_build, BuildArgs};
use cli::reflect::{cmd_reflect, ReflectArgs};
use cli::run::{cmd_run, RunArgs};

#[derive(Parser)]
#[command(
    name = "tessera",
    version,
    about = "Tessera kernel compiler: array kernels to WGSL compute shaders"
)]
struct Cli {
    /// Log compiler and runtime decisions (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a kernel to one WGSL shader per task
    Build(BuildArgs),
    /// List the entry point and bindings of a WGSL shader
    Reflect(ReflectArgs),
    /// Compile and launch a kernel
    Run(RunArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build(args) => cmd_build(args),
        Command::Reflect(args) => cmd_reflect(args),
        Command::Run(args) => cmd_run(args),
    }
}
