use std::path::PathBuf;
use std::process;

use clap::Args;

use tessera::ir::Literal;
use tessera::runtime::{Device, Runtime};
use tessera::scope::Value;

use super::{exit_with_compile_error, load_config, load_manifest, read_source};

#[derive(Args)]
pub struct RunArgs {
    /// Kernel source file
    pub input: PathBuf,
    /// Scope manifest declaring fields, textures, constants and functions
    #[arg(long, value_name = "FILE")]
    pub scope: Option<PathBuf>,
    /// Kernel argument; repeat per parameter. Comma-separated values form a vector
    #[arg(long = "arg", value_name = "VALUE", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Print a field's contents after the launch; repeatable
    #[arg(long, value_name = "FIELD")]
    pub read: Vec<String>,
    /// Record dispatches without a GPU
    #[arg(long)]
    pub headless: bool,
}

/// Parse `3`, `-1.5` or `1,2,3`.
pub fn parse_arg(text: &str) -> Result<Value, String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() == 1 {
        let part = parts[0];
        if let Ok(v) = part.parse::<i32>() {
            return Ok(Value::int(v));
        }
        return part
            .parse::<f32>()
            .map(Value::float)
            .map_err(|_| format!("invalid argument `{}`", text));
    }
    let values = parts
        .iter()
        .map(|p| p.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid vector argument `{}`", text))?;
    Value::vector(&values).map_err(|e| e.to_string())
}

pub fn cmd_run(args: RunArgs) {
    let config = load_config(&args.input);
    if args.headless {
        run_on(Runtime::headless(config), &args);
    } else {
        match Runtime::gpu(config) {
            Ok(runtime) => run_on(runtime, &args),
            Err(e) => {
                eprintln!("error: {} (try --headless)", e);
                process::exit(1);
            }
        }
    }
}

fn run_on<D: Device>(mut runtime: Runtime<D>, args: &RunArgs) {
    let source = read_source(&args.input);
    let manifest = load_manifest(args.scope.as_deref());
    let scope = match manifest.build(&mut runtime) {
        Ok(scope) => scope,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    let values: Vec<Value> = match args.args.iter().map(|a| parse_arg(a)).collect() {
        Ok(values) => values,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let kernel = match runtime.kernel(&scope, &source) {
        Ok(kernel) => kernel,
        Err(tessera::runtime::RuntimeError::Compile(e)) => {
            exit_with_compile_error(&e, &args.input, &source)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    eprintln!(
        "Running {} on {} ({} task(s))",
        args.input.display(),
        runtime.device().name(),
        kernel.compiled.tasks.len()
    );

    let result = runtime.launch(&kernel, &values).and_then(|launch| launch.wait());
    match result {
        Ok(ret) if ret.is_empty() => {}
        Ok(ret) => println!("{}", format_literals(&ret)),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }

    for name in &args.read {
        let Some(Value::Field(field)) = scope.get_stored(name) else {
            eprintln!("error: `{}` is not a field in scope", name);
            process::exit(1);
        };
        let words = match runtime.read_field::<u32>(field) {
            Ok(words) => words,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        };
        let prims = field.elem.component_prims();
        let literals: Vec<Literal> = words
            .iter()
            .zip(prims.iter().cycle())
            .map(|(word, prim)| Literal::from_bits(*word, *prim))
            .collect();
        println!("{} = {}", name, format_literals(&literals));
    }
}

fn format_literals(values: &[Literal]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    if parts.len() == 1 {
        parts[0].clone()
    } else {
        format!("[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("3").unwrap(), Value::int(3));
        assert_eq!(parse_arg("-1.5").unwrap(), Value::float(-1.5));
        assert_eq!(parse_arg("1, 2").unwrap(), Value::vector(&[1.0, 2.0]).unwrap());
        assert!(parse_arg("abc").is_err());
        assert!(parse_arg("1,x").is_err());
    }
}
