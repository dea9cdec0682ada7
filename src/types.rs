//! Value types of the kernel language and their broadcasting rules.

use std::fmt;

use thiserror::Error;

use crate::syntax::ast::{BinOp, UnOp};

/// Scalar element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prim {
    I32,
    U32,
    F32,
}

impl Prim {
    pub fn wgsl_name(self) -> &'static str {
        match self {
            Prim::I32 => "i32",
            Prim::U32 => "u32",
            Prim::F32 => "f32",
        }
    }

    pub fn is_float(self) -> bool {
        self == Prim::F32
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Element promotion for mixed operands: any f32 wins, then i32.
    pub fn promote(a: Prim, b: Prim) -> Prim {
        if a == b {
            a
        } else if a == Prim::F32 || b == Prim::F32 {
            Prim::F32
        } else {
            Prim::I32
        }
    }

    pub fn parse(text: &str) -> Option<Prim> {
        match text {
            "i32" | "int" | "int32" => Some(Prim::I32),
            "u32" | "uint" | "uint32" => Some(Prim::U32),
            "f32" | "float" | "float32" => Some(Prim::F32),
            _ => None,
        }
    }
}

impl fmt::Display for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

/// A kernel value type.
///
/// `Matrix(elem, n, m)` has `n` rows and `m` columns; components are
/// numbered row-major.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(Prim),
    Vector(Prim, u8),
    Matrix(Prim, u8, u8),
    Struct(StructTy),
}

/// Ordered struct members; order determines layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructTy {
    pub fields: Vec<(String, Type)>,
}

impl StructTy {
    pub fn new(fields: Vec<(String, Type)>) -> Self {
        Self { fields }
    }

    pub fn component_count(&self) -> u32 {
        self.fields.iter().map(|(_, ty)| ty.component_count()).sum()
    }

    /// Component offset and type of a member; offset is the sum of the
    /// preceding members' component counts.
    pub fn field_offset(&self, field_name: &str) -> Option<(u32, &Type)> {
        let mut offset = 0u32;
        for (name, ty) in &self.fields {
            if name == field_name {
                return Some((offset, ty));
            }
            offset += ty.component_count();
        }
        None
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum TypeError {
    #[error("shape mismatch between {lhs} and {rhs}")]
    ShapeMismatch { lhs: Type, rhs: Type },
    #[error("{ty} has no field `{name}`")]
    UnknownField { name: String, ty: Type },
    #[error("operator `{op}` cannot be applied to {ty}")]
    InvalidOperand { op: String, ty: Type },
    #[error("{what} must have 2 to 4 components, found {size}")]
    InvalidSize { what: &'static str, size: usize },
}

pub const I32: Type = Type::Scalar(Prim::I32);
pub const U32: Type = Type::Scalar(Prim::U32);
pub const F32: Type = Type::Scalar(Prim::F32);

impl Type {
    pub fn vector(prim: Prim, n: usize) -> Result<Type, TypeError> {
        if !(2..=4).contains(&n) {
            return Err(TypeError::InvalidSize {
                what: "vector",
                size: n,
            });
        }
        Ok(Type::Vector(prim, n as u8))
    }

    /// Matrices are always stored as f32.
    pub fn matrix(rows: usize, cols: usize) -> Result<Type, TypeError> {
        for size in [rows, cols] {
            if !(2..=4).contains(&size) {
                return Err(TypeError::InvalidSize {
                    what: "matrix",
                    size,
                });
            }
        }
        Ok(Type::Matrix(Prim::F32, rows as u8, cols as u8))
    }

    pub fn prim(&self) -> Option<Prim> {
        match self {
            Type::Scalar(p) | Type::Vector(p, _) | Type::Matrix(p, _, _) => Some(*p),
            Type::Struct(_) => None,
        }
    }

    pub fn component_count(&self) -> u32 {
        match self {
            Type::Scalar(_) => 1,
            Type::Vector(_, n) => *n as u32,
            Type::Matrix(_, n, m) => (*n as u32) * (*m as u32),
            Type::Struct(s) => s.component_count(),
        }
    }

    /// Element type of every component, in storage order.
    pub fn component_prims(&self) -> Vec<Prim> {
        match self {
            Type::Struct(s) => s
                .fields
                .iter()
                .flat_map(|(_, ty)| ty.component_prims())
                .collect(),
            other => {
                let prim = other.prim().unwrap_or(Prim::I32);
                vec![prim; other.component_count() as usize]
            }
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(..))
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, Type::Matrix(..))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    /// Same shape with a different element type. Matrices stay f32.
    pub fn with_prim(&self, prim: Prim) -> Type {
        match self {
            Type::Scalar(_) => Type::Scalar(prim),
            Type::Vector(_, n) => Type::Vector(prim, *n),
            Type::Matrix(..) | Type::Struct(_) => self.clone(),
        }
    }

    /// Type of one component: the element scalar for vectors and matrices.
    pub fn component_type(&self) -> Type {
        match self.prim() {
            Some(p) => Type::Scalar(p),
            None => self.clone(),
        }
    }

    /// Type produced by indexing once: a vector component or a matrix row.
    pub fn index_type(&self) -> Option<Type> {
        match self {
            Type::Vector(p, _) => Some(Type::Scalar(*p)),
            Type::Matrix(p, _, m) => Some(Type::Vector(*p, *m)),
            _ => None,
        }
    }

    /// Member lookup on a struct type.
    pub fn member(&self, name: &str) -> Result<(u32, Type), TypeError> {
        let unknown = || TypeError::UnknownField {
            name: name.to_string(),
            ty: self.clone(),
        };
        match self {
            Type::Struct(s) => s
                .field_offset(name)
                .map(|(offset, ty)| (offset, ty.clone()))
                .ok_or_else(unknown),
            _ => Err(unknown()),
        }
    }

    /// WGSL spelling of a value type. Matrices map to `mat{cols}x{rows}<f32>`.
    pub fn wgsl(&self) -> String {
        match self {
            Type::Scalar(p) => p.wgsl_name().to_string(),
            Type::Vector(p, n) => format!("vec{}<{}>", n, p),
            Type::Matrix(p, n, m) => format!("mat{}x{}<{}>", m, n, p),
            Type::Struct(s) => {
                let parts: Vec<String> = s
                    .fields
                    .iter()
                    .map(|(name, ty)| format!("{}: {}", name, ty.wgsl()))
                    .collect();
                format!("struct {{ {} }}", parts.join(", "))
            }
        }
    }

    /// Parse a type name: `f32`, `vec3<f32>`, `vec3f`, `mat{rows}x{cols}`.
    pub fn parse(text: &str) -> Option<Type> {
        let text = text.trim();
        if let Some(p) = Prim::parse(text) {
            return Some(Type::Scalar(p));
        }
        if let Some(rest) = text.strip_prefix("vec") {
            let n = rest.chars().next()?.to_digit(10)? as usize;
            let tail = &rest[1..];
            let prim = match tail {
                "" | "f" => Prim::F32,
                "i" => Prim::I32,
                "u" => Prim::U32,
                _ => Prim::parse(tail.strip_prefix('<')?.strip_suffix('>')?)?,
            };
            return Type::vector(prim, n).ok();
        }
        if let Some(rest) = text.strip_prefix("mat") {
            let rest = rest
                .strip_suffix("<f32>")
                .or_else(|| rest.strip_suffix('f'))
                .unwrap_or(rest);
            let (rows, cols) = rest.split_once('x')?;
            return Type::matrix(rows.parse().ok()?, cols.parse().ok()?).ok();
        }
        None
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(p) => write!(f, "{}", p),
            Type::Vector(p, n) => write!(f, "vec{}<{}>", n, p),
            Type::Matrix(p, n, m) => write!(f, "mat{}x{}<{}>", n, m, p),
            Type::Struct(s) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, ty)?;
                }
                write!(f, " }}")
            }
        }
    }
}

// ─── Broadcasting ──────────────────────────────────────────────────

/// Common shape of two operands with the promoted element type.
///
/// Scalars broadcast to any tensor shape; tensors must agree exactly.
pub fn broadcast(lhs: &Type, rhs: &Type) -> Result<Type, TypeError> {
    let mismatch = || TypeError::ShapeMismatch {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    };
    let (lp, rp) = match (lhs.prim(), rhs.prim()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(mismatch()),
    };
    let prim = Prim::promote(lp, rp);
    match (lhs, rhs) {
        (Type::Scalar(_), Type::Scalar(_)) => Ok(Type::Scalar(prim)),
        (Type::Scalar(_), Type::Vector(_, n)) | (Type::Vector(_, n), Type::Scalar(_)) => {
            Ok(Type::Vector(prim, *n))
        }
        (Type::Vector(_, a), Type::Vector(_, b)) if a == b => Ok(Type::Vector(prim, *a)),
        (Type::Scalar(_), Type::Matrix(_, n, m)) | (Type::Matrix(_, n, m), Type::Scalar(_)) => {
            Ok(Type::Matrix(Prim::F32, *n, *m))
        }
        (Type::Matrix(_, n1, m1), Type::Matrix(_, n2, m2)) if n1 == n2 && m1 == m2 => {
            Ok(Type::Matrix(Prim::F32, *n1, *m1))
        }
        _ => Err(mismatch()),
    }
}

/// Standard linear-algebra product of matrices and vectors.
pub fn matmul(lhs: &Type, rhs: &Type) -> Result<Type, TypeError> {
    let mismatch = || TypeError::ShapeMismatch {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    };
    match (lhs, rhs) {
        (Type::Matrix(_, n, k1), Type::Matrix(_, k2, m)) if k1 == k2 => {
            Ok(Type::Matrix(Prim::F32, *n, *m))
        }
        (Type::Matrix(_, n, k1), Type::Vector(_, k2)) if k1 == k2 => {
            Ok(Type::Vector(Prim::F32, *n))
        }
        (Type::Vector(_, k1), Type::Matrix(_, k2, m)) if k1 == k2 => {
            Ok(Type::Vector(Prim::F32, *m))
        }
        _ => Err(mismatch()),
    }
}

/// Operand and result types of a binary operator.
///
/// Both operands are converted to the operand type before the operation.
/// Comparisons and logical operators produce `i32` 0/1 values; `/` and `**`
/// always compute in `f32`.
pub fn binary_types(op: BinOp, lhs: &Type, rhs: &Type) -> Result<(Type, Type), TypeError> {
    if op == BinOp::MatMul {
        let result = matmul(lhs, rhs)?;
        return Ok((lhs.with_prim(Prim::F32), result));
    }

    let shape = broadcast(lhs, rhs)?;
    let invalid = |ty: &Type| TypeError::InvalidOperand {
        op: op.symbol().to_string(),
        ty: ty.clone(),
    };
    let prim = shape.prim().ok_or_else(|| invalid(&shape))?;

    if shape.is_matrix()
        && (op.is_comparison() || op.is_logical() || op.is_bitwise() || op == BinOp::FloorDiv)
    {
        return Err(invalid(&shape));
    }

    match op {
        BinOp::Div | BinOp::Pow => {
            let ty = shape.with_prim(Prim::F32);
            Ok((ty.clone(), ty))
        }
        _ if op.is_comparison() || op.is_logical() => {
            Ok((shape.clone(), shape.with_prim(Prim::I32)))
        }
        _ if op.is_bitwise() => {
            if prim.is_float() {
                let culprit = if lhs.prim() == Some(Prim::F32) { lhs } else { rhs };
                return Err(invalid(culprit));
            }
            Ok((shape.clone(), shape))
        }
        _ => Ok((shape.clone(), shape)),
    }
}

/// Result type of a unary operator.
pub fn unary_type(op: UnOp, operand: &Type) -> Result<Type, TypeError> {
    let invalid = || TypeError::InvalidOperand {
        op: match op {
            UnOp::Neg => "-",
            UnOp::Plus => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
        .to_string(),
        ty: operand.clone(),
    };
    let prim = operand.prim().ok_or_else(invalid)?;
    match op {
        UnOp::Plus => Ok(operand.clone()),
        UnOp::Neg if prim == Prim::U32 => Err(invalid()),
        UnOp::Neg => Ok(operand.clone()),
        UnOp::Not if operand.is_matrix() => Err(invalid()),
        UnOp::Not => Ok(operand.with_prim(Prim::I32)),
        UnOp::BitNot if prim.is_float() => Err(invalid()),
        UnOp::BitNot => Ok(operand.clone()),
    }
}
