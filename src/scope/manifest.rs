//! Scope manifests: host bindings declared in TOML.
//!
//! ```toml
//! [constants]
//! n = 128
//! gravity = [0.0, -9.8]
//!
//! [fields.x]
//! elem = "vec2f"
//! shape = [128]
//!
//! [fields.particles]
//! members = ["pos: vec3f", "mass: f32"]
//! shape = [64]
//!
//! [textures.image]
//! dims = [512, 512]
//! format = "rgba8unorm"
//! storage = true
//!
//! [functions]
//! sq = "(x) => x * x"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::{
    FieldId, FieldInfo, FunctionSource, Record, Scope, TexelFormat, TextureId, TextureInfo, Value,
};
use crate::ir::Literal;
use crate::types::{Prim, StructTy, Type};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("constant `{name}`: {message}")]
    Constant { name: String, message: String },
    #[error("field `{name}`: {message}")]
    Field { name: String, message: String },
    #[error("texture `{name}`: {message}")]
    Texture { name: String, message: String },
    #[error("function `{name}` does not parse: {message}")]
    Function { name: String, message: String },
    #[error("cannot create `{name}`: {message}")]
    Resource { name: String, message: String },
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeManifest {
    #[serde(default)]
    pub constants: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDecl>,
    #[serde(default)]
    pub textures: BTreeMap<String, TextureDecl>,
    #[serde(default)]
    pub functions: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub shape: Vec<usize>,
    #[serde(default)]
    pub elem: Option<String>,
    /// Struct members as `"name: type"`, in layout order.
    #[serde(default)]
    pub members: Vec<String>,
    /// Fill value written to every component on creation.
    #[serde(default)]
    pub init: Option<f64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextureDecl {
    pub dims: Vec<u32>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub storage: bool,
}

fn default_format() -> String {
    "rgba8unorm".to_string()
}

impl FieldDecl {
    pub fn elem_type(&self, name: &str) -> Result<Type, ManifestError> {
        let err = |message: String| ManifestError::Field {
            name: name.to_string(),
            message,
        };
        if !self.members.is_empty() {
            if self.elem.is_some() {
                return Err(err("`elem` and `members` are exclusive".to_string()));
            }
            let mut fields = Vec::new();
            for member in &self.members {
                let (member_name, ty) = member
                    .split_once(':')
                    .ok_or_else(|| err(format!("member `{}` must be `name: type`", member)))?;
                let ty = Type::parse(ty)
                    .ok_or_else(|| err(format!("unknown member type `{}`", ty.trim())))?;
                fields.push((member_name.trim().to_string(), ty));
            }
            return Ok(Type::Struct(StructTy::new(fields)));
        }
        let elem = self.elem.as_deref().unwrap_or("f32");
        Type::parse(elem).ok_or_else(|| err(format!("unknown element type `{}`", elem)))
    }
}

/// Creates device resources for manifest declarations.
pub trait ResourceRegistry {
    fn register_field(
        &mut self,
        name: &str,
        shape: &[usize],
        elem: Type,
        init: Option<f64>,
    ) -> Result<Arc<FieldInfo>, ManifestError>;

    fn register_texture(
        &mut self,
        name: &str,
        dims: &[u32],
        format: TexelFormat,
        storage: bool,
    ) -> Result<Arc<TextureInfo>, ManifestError>;
}

/// Assigns ids without allocating anything; enough to compile kernels.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    next_field: u32,
    next_texture: u32,
}

impl ResourceRegistry for StaticRegistry {
    fn register_field(
        &mut self,
        name: &str,
        shape: &[usize],
        elem: Type,
        _init: Option<f64>,
    ) -> Result<Arc<FieldInfo>, ManifestError> {
        let id = FieldId(self.next_field);
        self.next_field += 1;
        Ok(Arc::new(FieldInfo {
            id,
            name: name.to_string(),
            shape: shape.to_vec(),
            elem,
        }))
    }

    fn register_texture(
        &mut self,
        name: &str,
        dims: &[u32],
        format: TexelFormat,
        storage: bool,
    ) -> Result<Arc<TextureInfo>, ManifestError> {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        Ok(Arc::new(TextureInfo {
            id,
            name: name.to_string(),
            dims: dims.to_vec(),
            format,
            storage,
        }))
    }
}

impl ScopeManifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Build a scope, creating resources through `registry` in name order.
    pub fn build(&self, registry: &mut impl ResourceRegistry) -> Result<Scope, ManifestError> {
        let mut scope = Scope::new();

        for (name, value) in &self.constants {
            let value = constant_value(value).map_err(|message| ManifestError::Constant {
                name: name.clone(),
                message,
            })?;
            scope.add_stored(name.as_str(), value);
        }

        for (name, decl) in &self.fields {
            if decl.shape.is_empty() || decl.shape.contains(&0) {
                return Err(ManifestError::Field {
                    name: name.clone(),
                    message: "shape must be non-empty with positive extents".to_string(),
                });
            }
            let elem = decl.elem_type(name)?;
            let info = registry.register_field(name, &decl.shape, elem, decl.init)?;
            scope.add_stored(name.as_str(), Value::Field(info));
        }

        for (name, decl) in &self.textures {
            let err = |message: String| ManifestError::Texture {
                name: name.clone(),
                message,
            };
            if !(2..=3).contains(&decl.dims.len()) {
                return Err(err(format!(
                    "expected 2 or 3 dimensions, found {}",
                    decl.dims.len()
                )));
            }
            let format = TexelFormat::parse(&decl.format)
                .ok_or_else(|| err(format!("unknown format `{}`", decl.format)))?;
            let info = registry.register_texture(name, &decl.dims, format, decl.storage)?;
            scope.add_stored(name.as_str(), Value::Texture(info));
        }

        for (name, source) in &self.functions {
            let func = FunctionSource::parse(name, source).map_err(|diags| {
                ManifestError::Function {
                    name: name.clone(),
                    message: diags
                        .iter()
                        .map(|d| d.message.clone())
                        .collect::<Vec<_>>()
                        .join("; "),
                }
            })?;
            scope.add_stored(name.as_str(), Value::Function(Arc::new(func)));
        }

        Ok(scope)
    }
}

fn number(value: &toml::Value) -> Option<Literal> {
    match value {
        toml::Value::Integer(v) => i32::try_from(*v).ok().map(Literal::I32),
        toml::Value::Float(v) => Some(Literal::F32(*v as f32)),
        toml::Value::Boolean(v) => Some(Literal::I32(*v as i32)),
        _ => None,
    }
}

fn constant_value(value: &toml::Value) -> Result<Value, String> {
    if let Some(lit) = number(value) {
        return Ok(Value::Number(lit));
    }
    match value {
        toml::Value::Integer(v) => Err(format!("{} does not fit in i32", v)),
        toml::Value::Array(items) if items.iter().all(|i| i.is_array()) => {
            let mut values = Vec::new();
            let mut cols = None;
            for row in items {
                let row = row.as_array().map(Vec::as_slice).unwrap_or_default();
                if *cols.get_or_insert(row.len()) != row.len() {
                    return Err("matrix rows differ in length".to_string());
                }
                for item in row {
                    let lit = number(item).ok_or("matrix entries must be numbers")?;
                    values.push(lit.cast(Prim::F32));
                }
            }
            let ty = Type::matrix(items.len(), cols.unwrap_or(0)).map_err(|e| e.to_string())?;
            Ok(Value::NumberArray { values, ty })
        }
        toml::Value::Array(items) => {
            let lits = items
                .iter()
                .map(number)
                .collect::<Option<Vec<_>>>()
                .ok_or("array entries must be numbers")?;
            let prim = lits
                .iter()
                .map(|l| l.prim())
                .reduce(Prim::promote)
                .unwrap_or(Prim::F32);
            let ty = Type::vector(prim, lits.len()).map_err(|e| e.to_string())?;
            Ok(Value::NumberArray {
                values: lits.into_iter().map(|l| l.cast(prim)).collect(),
                ty,
            })
        }
        toml::Value::Table(table) => {
            let mut entries = Vec::new();
            for (key, item) in table {
                entries.push((key.clone(), constant_value(item)?));
            }
            Ok(Value::Record(Arc::new(Record::new(entries))))
        }
        other => Err(format!("unsupported constant {}", other.type_str())),
    }
}
