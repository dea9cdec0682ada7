//! Tessera: an embedded kernel compiler.
//!
//! Kernel functions written with array syntax are parsed, lowered against a
//! [`scope::Scope`] of host values into a typed [`ir::KernelIr`], and emitted
//! as one WGSL compute shader per task. The [`runtime`] compiles those
//! shaders into cached pipelines and launches them on a [`runtime::Device`].

pub mod codegen;
pub mod compile;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod ir;
pub mod library;
pub mod lower;
pub mod reflect;
pub mod runtime;
pub mod scope;
pub mod syntax;
pub mod types;

// Short paths for the front end
pub use syntax::span;

// Re-export public API
pub use compile::{compile_kernel, compile_kernel_with_templates, CompiledKernel, CompiledTask};
pub use config::{CompilerConfig, Config, RuntimeConfig};
pub use error::CompileError;
pub use reflect::{reflect, ShaderReflection};
pub use runtime::{HeadlessDevice, Launch, Runtime, RuntimeError, WgpuDevice};
pub use scope::{Scope, Value};
