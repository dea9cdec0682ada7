//! Binding and entry-point recovery from WGSL text.
//!
//! Generated shaders name their resources by convention:
//!
//! | variable             | resource                       |
//! |----------------------|--------------------------------|
//! | `field_{id}_{name}`  | field storage words            |
//! | `args`               | kernel arguments               |
//! | `rets`               | kernel return words            |
//! | `global_tmps`        | locals shared between tasks    |
//! | `tex_{id}`           | sampled texture                |
//! | `storage_tex_{id}`   | write-only storage texture     |
//! | `sampler_{id}`       | sampler paired with `tex_{id}` |
//!
//! Reflection scans declarations of the form
//! `@group(g) @binding(b) var<...> name : type;` and the stage attribute of
//! the entry function. It is a scanner, not a WGSL parser: anything it does
//! not recognise between declarations is skipped.

use std::fmt;

use crate::scope::{FieldId, TextureId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectionError {
    #[error("shader has no @compute, @vertex or @fragment entry point")]
    NoEntryPoint,

    #[error("malformed binding declaration at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },

    #[error("binding variable `{name}` does not follow a known resource naming scheme")]
    UnknownResource { name: String },
}

// ─── Bindings ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Field(FieldId),
    Args,
    Rets,
    GlobalTmps,
    Texture(TextureId),
    StorageTexture(TextureId),
    Sampler(TextureId),
}

impl ResourceKind {
    /// Recover the resource kind from a binding variable name.
    pub fn from_var_name(name: &str) -> Option<ResourceKind> {
        let id_after = |prefix: &str| -> Option<u32> {
            let rest = name.strip_prefix(prefix)?;
            let digits = rest.split('_').next()?;
            digits.parse().ok()
        };
        match name {
            "args" => return Some(ResourceKind::Args),
            "rets" => return Some(ResourceKind::Rets),
            "global_tmps" => return Some(ResourceKind::GlobalTmps),
            _ => {}
        }
        if let Some(id) = id_after("field_") {
            return Some(ResourceKind::Field(FieldId(id)));
        }
        if let Some(id) = id_after("storage_tex_") {
            return Some(ResourceKind::StorageTexture(TextureId(id)));
        }
        if let Some(id) = id_after("tex_") {
            return Some(ResourceKind::Texture(TextureId(id)));
        }
        id_after("sampler_").map(|id| ResourceKind::Sampler(TextureId(id)))
    }

    pub fn is_buffer(&self) -> bool {
        matches!(
            self,
            ResourceKind::Field(_) | ResourceKind::Args | ResourceKind::Rets | ResourceKind::GlobalTmps
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Field(id) => write!(f, "field {}", id.0),
            ResourceKind::Args => write!(f, "args"),
            ResourceKind::Rets => write!(f, "rets"),
            ResourceKind::GlobalTmps => write!(f, "global temporaries"),
            ResourceKind::Texture(id) => write!(f, "texture {}", id.0),
            ResourceKind::StorageTexture(id) => write!(f, "storage texture {}", id.0),
            ResourceKind::Sampler(id) => write!(f, "sampler {}", id.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn wgsl(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "read_write",
        }
    }

    fn parse(text: &str) -> Option<Access> {
        match text {
            "read" => Some(Access::Read),
            "write" => Some(Access::Write),
            "read_write" => Some(Access::ReadWrite),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
    pub access: Access,
    /// The WGSL variable name.
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Compute,
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Compute => write!(f, "compute"),
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    /// `@workgroup_size` of a compute entry point, missing dimensions as 1.
    pub workgroup_size: Option<[u32; 3]>,
    /// Ordered by `(group, binding)`, without duplicates.
    pub bindings: Vec<ResourceBinding>,
}

// ─── Scanner ──────────────────────────────────────────────────────

/// Replace comments with spaces, keeping byte offsets stable.
fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"//") {
            while i < bytes.len() && bytes[i] != b'\n' {
                out[i] = b' ';
                i += 1;
            }
        } else if bytes[i..].starts_with(b"/*") {
            let mut depth = 0;
            while i < bytes.len() {
                if bytes[i..].starts_with(b"/*") {
                    depth += 1;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 2;
                } else if bytes[i..].starts_with(b"*/") {
                    depth -= 1;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 2;
                    if depth == 0 {
                        break;
                    }
                } else {
                    if bytes[i] != b'\n' {
                        out[i] = b' ';
                    }
                    i += 1;
                }
            }
        } else {
            i += 1;
        }
    }
    // Every byte of a commented character is blanked, so the text stays UTF-8.
    String::from_utf8_lossy(&out).into_owned()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Cursor<'s> {
    text: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(text: &'s str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn rest(&self) -> &'s str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, message: impl Into<String>) -> ReflectionError {
        ReflectionError::Malformed {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ReflectionError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", token)))
        }
    }

    fn ident(&mut self) -> Result<&'s str, ReflectionError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest.bytes().take_while(|b| is_ident_byte(*b)).count();
        if len == 0 {
            return Err(self.error("expected an identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn number(&mut self) -> Result<u32, ReflectionError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let value = rest[..len]
            .parse()
            .map_err(|_| self.error("expected an integer"))?;
        self.pos += len;
        // Integer literal suffix.
        if self.rest().starts_with(['u', 'i']) {
            self.pos += 1;
        }
        Ok(value)
    }

    /// Text up to (not including) the next `;`.
    fn until_semicolon(&mut self) -> Result<&'s str, ReflectionError> {
        let rest = self.rest();
        let end = rest.find(';').ok_or_else(|| self.error("missing `;`"))?;
        self.pos += end + 1;
        Ok(rest[..end].trim())
    }
}

/// Word-bounded occurrences of `needle`.
fn find_attribute(text: &str, needle: &str) -> Vec<usize> {
    text.match_indices(needle)
        .filter(|(at, _)| {
            text.as_bytes()
                .get(at + needle.len())
                .map_or(true, |b| !is_ident_byte(*b))
        })
        .map(|(at, _)| at)
        .collect()
}

fn parse_binding(text: &str, at: usize) -> Result<ResourceBinding, ReflectionError> {
    let mut cur = Cursor::new(text, at);
    cur.expect("@group")?;
    cur.expect("(")?;
    let group = cur.number()?;
    cur.expect(")")?;
    cur.expect("@binding")?;
    cur.expect("(")?;
    let binding = cur.number()?;
    cur.expect(")")?;
    cur.expect("var")?;

    let mut access = None;
    if cur.eat("<") {
        // Address space; storage without an access mode and uniform are read-only.
        cur.ident()?;
        access = Some(Access::Read);
        if cur.eat(",") {
            let mode = cur.ident()?;
            access = Some(
                Access::parse(mode).ok_or_else(|| cur.error(format!("unknown access mode `{}`", mode)))?,
            );
        }
        cur.expect(">")?;
    }

    let name = cur.ident()?.to_string();
    cur.expect(":")?;
    let ty = cur.until_semicolon()?;

    let access = access.unwrap_or_else(|| {
        if ty.contains("read_write>") {
            Access::ReadWrite
        } else if ty.contains("write>") {
            Access::Write
        } else {
            Access::Read
        }
    });
    let kind = ResourceKind::from_var_name(&name)
        .ok_or_else(|| ReflectionError::UnknownResource { name: name.clone() })?;

    Ok(ResourceBinding {
        group,
        binding,
        kind,
        access,
        name,
    })
}

fn parse_workgroup_size(text: &str, at: usize) -> Result<[u32; 3], ReflectionError> {
    let mut cur = Cursor::new(text, at);
    cur.expect("@workgroup_size")?;
    cur.expect("(")?;
    let mut size = [1u32; 3];
    size[0] = cur.number()?;
    for slot in size.iter_mut().skip(1) {
        if !cur.eat(",") || cur.eat(")") {
            break;
        }
        *slot = cur.number()?;
    }
    if cur.text[..cur.pos].ends_with(')') {
        return Ok(size);
    }
    cur.eat(",");
    cur.expect(")")?;
    Ok(size)
}

/// Recover the binding table, entry stage and workgroup size of a shader.
pub fn reflect(source: &str) -> Result<ShaderReflection, ReflectionError> {
    let text = strip_comments(source);

    let mut bindings: Vec<ResourceBinding> = Vec::new();
    for at in find_attribute(&text, "@group") {
        let binding = parse_binding(&text, at)?;
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
    }
    bindings.sort_by_key(|b| (b.group, b.binding));

    let stages = [
        ("@compute", ShaderStage::Compute),
        ("@vertex", ShaderStage::Vertex),
        ("@fragment", ShaderStage::Fragment),
    ];
    let (stage_at, stage) = stages
        .iter()
        .filter_map(|(attr, stage)| find_attribute(&text, attr).first().map(|at| (*at, *stage)))
        .min_by_key(|(at, _)| *at)
        .ok_or(ReflectionError::NoEntryPoint)?;

    let after = &text[stage_at..];
    let fn_at = find_attribute(after, "fn")
        .into_iter()
        .find(|at| *at == 0 || !is_ident_byte(after.as_bytes()[at - 1]))
        .ok_or(ReflectionError::NoEntryPoint)?;
    let mut cur = Cursor::new(after, fn_at + 2);
    let entry_point = cur.ident()?.to_string();

    let workgroup_size = match stage {
        ShaderStage::Compute => match find_attribute(&after[..fn_at], "@workgroup_size").first() {
            Some(at) => Some(parse_workgroup_size(after, *at)?),
            None => None,
        },
        _ => None,
    };

    tracing::trace!(
        "reflected {} entry `{}` with {} bindings",
        stage,
        entry_point,
        bindings.len()
    );

    Ok(ShaderReflection {
        stage,
        entry_point,
        workgroup_size,
        bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADER: &str = r#"
// generated
@group(0) @binding(0) var<storage, read_write> field_3_pos: array<i32>;
@group(0)
  @binding(1)
  var<storage, read> args : array<i32>;
/* @group(0) @binding(9) var<storage, read> ghost: array<i32>; */
@group(0) @binding(2) var tex_1: texture_2d<f32>;
@group(0) @binding(3) var sampler_1: sampler;
@group(0) @binding(4) var storage_tex_2: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
}
"#;

    #[test]
    fn test_bindings_and_stage() {
        let r = reflect(SHADER).unwrap();
        assert_eq!(r.stage, ShaderStage::Compute);
        assert_eq!(r.entry_point, "main");
        assert_eq!(r.workgroup_size, Some([64, 1, 1]));
        let kinds: Vec<(u32, ResourceKind, Access)> =
            r.bindings.iter().map(|b| (b.binding, b.kind, b.access)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, ResourceKind::Field(FieldId(3)), Access::ReadWrite),
                (1, ResourceKind::Args, Access::Read),
                (2, ResourceKind::Texture(TextureId(1)), Access::Read),
                (3, ResourceKind::Sampler(TextureId(1)), Access::Read),
                (4, ResourceKind::StorageTexture(TextureId(2)), Access::Write),
            ]
        );
        assert_eq!(r.bindings[0].name, "field_3_pos");
    }

    #[test]
    fn test_empty_bindings_are_valid() {
        let r = reflect("@compute @workgroup_size(1, 2) fn run() {}").unwrap();
        assert!(r.bindings.is_empty());
        assert_eq!(r.entry_point, "run");
        assert_eq!(r.workgroup_size, Some([1, 2, 1]));
    }

    #[test]
    fn test_render_stages() {
        let r = reflect("@vertex fn vs() -> @builtin(position) vec4<f32> { return vec4<f32>(); }")
            .unwrap();
        assert_eq!(r.stage, ShaderStage::Vertex);
        assert_eq!(r.workgroup_size, None);
        let r = reflect("@fragment fn fs() {}").unwrap();
        assert_eq!(r.stage, ShaderStage::Fragment);
    }

    #[test]
    fn test_no_entry_point() {
        let err = reflect("@group(0) @binding(0) var<storage, read> args: array<i32>;").unwrap_err();
        assert_eq!(err, ReflectionError::NoEntryPoint);
        // An attribute inside a comment does not count.
        assert_eq!(reflect("// @compute\nfn main() {}").unwrap_err(), ReflectionError::NoEntryPoint);
    }

    #[test]
    fn test_duplicates_collapse() {
        let src = "@group(0) @binding(0) var<storage, read> args: array<i32>;\n\
                   @group(0) @binding(0) var<storage, read> args: array<i32>;\n\
                   @compute @workgroup_size(1) fn main() {}";
        assert_eq!(reflect(src).unwrap().bindings.len(), 1);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let src = "@group(0) @binding(0) var<storage, read> data: array<f32>;\n@compute @workgroup_size(1) fn main() {}";
        assert!(matches!(
            reflect(src).unwrap_err(),
            ReflectionError::UnknownResource { ref name } if name == "data"
        ));
        let src = "@group(0) @binding(x) var<storage, read> args: array<i32>;";
        assert!(matches!(reflect(src).unwrap_err(), ReflectionError::Malformed { .. }));
    }

    #[test]
    fn test_kind_from_names() {
        assert_eq!(
            ResourceKind::from_var_name("field_12_velocity_x"),
            Some(ResourceKind::Field(FieldId(12)))
        );
        assert_eq!(ResourceKind::from_var_name("global_tmps"), Some(ResourceKind::GlobalTmps));
        assert_eq!(ResourceKind::from_var_name("field_x"), None);
    }
}
