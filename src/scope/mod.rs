//! Name bindings visible to a kernel.
//!
//! A `Scope` maps names to host values (numbers, fields, textures, records,
//! helper functions) and, during lowering, to places and bound operands.

pub mod manifest;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::diagnostic::Diagnostic;
use crate::ir::{Literal, Operand};
use crate::lower::Place;
use crate::syntax::ast::FnDecl;
use crate::types::{Prim, Type, TypeError};

pub use manifest::{ManifestError, ResourceRegistry, ScopeManifest, StaticRegistry};

/// File id tagging spans of host-registered helper functions.
pub const HOST_FILE: u16 = 2;

// ─── Resources ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// A typed, shaped device array. Storage is one 32-bit word per component.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub id: FieldId,
    pub name: String,
    pub shape: Vec<usize>,
    pub elem: Type,
}

impl FieldInfo {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of 32-bit words backing the field.
    pub fn words(&self) -> usize {
        self.len() * self.elem.component_count() as usize
    }

    pub fn size_bytes(&self) -> u64 {
        (self.words() * 4) as u64
    }

    /// Row-major element strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for d in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.shape[d + 1];
        }
        strides
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
}

impl TexelFormat {
    pub fn wgsl_name(self) -> &'static str {
        match self {
            TexelFormat::Rgba8Unorm => "rgba8unorm",
            TexelFormat::Rgba16Float => "rgba16float",
            TexelFormat::Rgba32Float => "rgba32float",
            TexelFormat::R32Float => "r32float",
        }
    }

    pub fn parse(text: &str) -> Option<TexelFormat> {
        match text {
            "rgba8unorm" => Some(TexelFormat::Rgba8Unorm),
            "rgba16float" => Some(TexelFormat::Rgba16Float),
            "rgba32float" => Some(TexelFormat::Rgba32Float),
            "r32float" => Some(TexelFormat::R32Float),
            _ => None,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TexelFormat::Rgba8Unorm | TexelFormat::R32Float => 4,
            TexelFormat::Rgba16Float => 8,
            TexelFormat::Rgba32Float => 16,
        }
    }
}

/// A 2D or 3D texture. Storage textures are written with `textureStore`;
/// sampled textures are read with `textureLoad` and `textureSample`.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
    pub id: TextureId,
    pub name: String,
    pub dims: Vec<u32>,
    pub format: TexelFormat,
    pub storage: bool,
}

impl TextureInfo {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

// ─── Values ───────────────────────────────────────────────────────

/// Ordered named values, used for host objects and kernel-side structs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// A helper function callable from kernels, inlined at each call site.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSource {
    pub name: String,
    pub decl: Arc<FnDecl>,
}

impl FunctionSource {
    pub fn parse(name: &str, source: &str) -> Result<Self, Vec<Diagnostic>> {
        let decl = crate::syntax::parse_function(source, HOST_FILE)?;
        Ok(Self {
            name: name.to_string(),
            decl,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(Literal),
    /// A constant vector or matrix; components are row-major.
    NumberArray { values: Vec<Literal>, ty: Type },
    Field(Arc<FieldInfo>),
    Texture(Arc<TextureInfo>),
    Record(Arc<Record>),
    Function(Arc<FunctionSource>),
    /// An assignable location created during lowering.
    Place(Place),
    /// An already-lowered value such as a loop index.
    Bound(Operand, Type),
    /// Runtime kernel argument `index`.
    Arg { index: u32, ty: Type },
}

impl Value {
    pub fn int(v: i32) -> Value {
        Value::Number(Literal::I32(v))
    }

    pub fn float(v: f32) -> Value {
        Value::Number(Literal::F32(v))
    }

    pub fn vector(values: &[f32]) -> Result<Value, TypeError> {
        let ty = Type::vector(Prim::F32, values.len())?;
        Ok(Value::NumberArray {
            values: values.iter().map(|v| Literal::F32(*v)).collect(),
            ty,
        })
    }

    /// A matrix from its rows.
    pub fn matrix(rows: &[Vec<f32>]) -> Result<Value, TypeError> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let ty = Type::matrix(rows.len(), cols)?;
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(TypeError::ShapeMismatch {
                lhs: Type::vector(Prim::F32, cols)?,
                rhs: Type::vector(Prim::F32, bad.len())?,
            });
        }
        Ok(Value::NumberArray {
            values: rows.iter().flatten().map(|v| Literal::F32(*v)).collect(),
            ty,
        })
    }

    pub fn record(entries: Vec<(&str, Value)>) -> Value {
        Value::Record(Arc::new(Record::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )))
    }

    /// True for values that embed as literal operands.
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Number(_) | Value::NumberArray { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::NumberArray { .. } => "number array",
            Value::Field(_) => "field",
            Value::Texture(_) => "texture",
            Value::Record(_) => "record",
            Value::Function(_) => "function",
            Value::Place(_) => "variable",
            Value::Bound(..) => "value",
            Value::Arg { .. } => "kernel argument",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(lit) => write!(f, "{}", lit),
            Value::NumberArray { values, ty } => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}({})", ty, parts.join(", "))
            }
            Value::Field(info) => write!(f, "field {}{:?}: {}", info.name, info.shape, info.elem),
            Value::Texture(info) => write!(f, "texture {}{:?}", info.name, info.dims),
            Value::Record(record) => {
                let keys: Vec<&str> = record.entries.iter().map(|(k, _)| k.as_str()).collect();
                write!(f, "{{ {} }}", keys.join(", "))
            }
            Value::Function(func) => write!(f, "function {}", func.name),
            other => write!(f, "<{}>", other.kind_name()),
        }
    }
}

// ─── Scope ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Scope {
    stored: HashMap<String, Value>,
    receiver: Option<Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_stored(&self, name: &str) -> bool {
        self.stored.contains_key(name)
    }

    pub fn get_stored(&self, name: &str) -> Option<&Value> {
        self.stored.get(name)
    }

    pub fn add_stored(&mut self, name: impl Into<String>, value: Value) {
        self.stored.insert(name.into(), value);
    }

    pub fn clear_stored(&mut self) {
        self.stored.clear();
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stored.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_ref()
    }

    pub fn with_receiver(mut self, receiver: Value) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn can_evaluate(&self, path: &str) -> bool {
        self.try_evaluate(path).is_some()
    }

    /// Resolve a dotted path like `params.gravity.y` through nested records.
    ///
    /// `this` names the receiver. Returns `None` at the first missing segment
    /// or non-record intermediate.
    pub fn try_evaluate(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = if head == "this" {
            self.receiver.as_ref()?
        } else {
            self.stored.get(head)?
        };
        for segment in segments {
            match current {
                Value::Record(record) => current = record.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Union of two scopes; `b` wins on collisions, including the receiver.
    pub fn merge(a: &Scope, b: &Scope) -> Scope {
        let mut stored = a.stored.clone();
        for (name, value) in &b.stored {
            stored.insert(name.clone(), value.clone());
        }
        Scope {
            stored,
            receiver: b.receiver.clone().or_else(|| a.receiver.clone()),
        }
    }

    /// Host values only; drops lowering-time bindings.
    pub fn globals(&self) -> Scope {
        Scope {
            stored: self
                .stored
                .iter()
                .filter(|(_, v)| {
                    !matches!(v, Value::Place(_) | Value::Bound(..) | Value::Arg { .. })
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            receiver: None,
        }
    }

    /// Every field reachable from top-level names, ordered by id.
    pub fn fields(&self) -> Vec<Arc<FieldInfo>> {
        let mut out: Vec<Arc<FieldInfo>> = self
            .stored
            .values()
            .filter_map(|v| match v {
                Value::Field(info) => Some(info.clone()),
                _ => None,
            })
            .collect();
        out.sort_by_key(|f| f.id);
        out.dedup_by_key(|f| f.id);
        out
    }
}

#[cfg(test)]
mod tests;
