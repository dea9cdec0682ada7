//! Built-in operations callable from kernels.
//!
//! `INTRINSICS` maps names (reachable bare or with a `ti.` / `Math.` prefix)
//! to the statement they lower to. `LIBRARY` holds helper functions written
//! in the kernel language itself; they are parsed once per compile and
//! inlined like any user function.

use crate::ir::AtomicKind;
use crate::types::{broadcast, Prim, Type, TypeError};

/// File id tagging spans of library function source.
pub const LIBRARY_FILE: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    /// Component-wise float math; all operands are widened to f32.
    Float,
    /// Component-wise on the promoted operand type.
    Same,
    /// Component-wise sign, yielding i32.
    Sign,
    Dot,
    Length,
    Normalize,
    Cross,
    Transpose,
    Determinant,
    /// `dot(v, v)`.
    NormSqr,
    /// Composed from extracts during lowering.
    Sum,
    OuterProduct,
    Concat,
    Matmul,
    Cast(Prim),
    Bitcast(Prim),
    Atomic(AtomicKind),
    Random,
    TextureLoad,
    TextureStore,
    TextureSample,
    /// Marks a compile-time value.
    Static,
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Intrinsic {
    pub name: &'static str,
    pub arity: usize,
    pub kind: IntrinsicKind,
    /// WGSL call template; `{0}`, `{1}`… are replaced by argument expressions.
    pub template: &'static str,
}

/// Argument and result types of an intrinsic call.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub args: Vec<Type>,
    pub ret: Type,
}

macro_rules! intrinsic {
    ($name:literal, $arity:literal, $kind:expr, $template:literal) => {
        Intrinsic {
            name: $name,
            arity: $arity,
            kind: $kind,
            template: $template,
        }
    };
}

use IntrinsicKind as K;

pub static INTRINSICS: &[Intrinsic] = &[
    // ── math ──
    intrinsic!("sin", 1, K::Float, "sin({0})"),
    intrinsic!("cos", 1, K::Float, "cos({0})"),
    intrinsic!("tan", 1, K::Float, "tan({0})"),
    intrinsic!("asin", 1, K::Float, "asin({0})"),
    intrinsic!("acos", 1, K::Float, "acos({0})"),
    intrinsic!("atan", 1, K::Float, "atan({0})"),
    intrinsic!("atan2", 2, K::Float, "atan2({0}, {1})"),
    intrinsic!("tanh", 1, K::Float, "tanh({0})"),
    intrinsic!("exp", 1, K::Float, "exp({0})"),
    intrinsic!("log", 1, K::Float, "log({0})"),
    intrinsic!("sqrt", 1, K::Float, "sqrt({0})"),
    intrinsic!("rsqrt", 1, K::Float, "inverseSqrt({0})"),
    intrinsic!("pow", 2, K::Float, "pow({0}, {1})"),
    intrinsic!("floor", 1, K::Float, "floor({0})"),
    intrinsic!("ceil", 1, K::Float, "ceil({0})"),
    intrinsic!("round", 1, K::Float, "round({0})"),
    intrinsic!("fract", 1, K::Float, "fract({0})"),
    intrinsic!("step", 2, K::Float, "step({0}, {1})"),
    intrinsic!("mix", 3, K::Float, "mix({0}, {1}, {2})"),
    intrinsic!("abs", 1, K::Same, "abs({0})"),
    intrinsic!("max", 2, K::Same, "max({0}, {1})"),
    intrinsic!("min", 2, K::Same, "min({0}, {1})"),
    intrinsic!("clamp", 3, K::Same, "clamp({0}, {1}, {2})"),
    intrinsic!("sign", 1, K::Sign, "sign({0})"),
    intrinsic!("sgn", 1, K::Sign, "sign({0})"),
    // ── casts ──
    intrinsic!("i32", 1, K::Cast(Prim::I32), "i32({0})"),
    intrinsic!("u32", 1, K::Cast(Prim::U32), "u32({0})"),
    intrinsic!("f32", 1, K::Cast(Prim::F32), "f32({0})"),
    intrinsic!("bitcast_i32", 1, K::Bitcast(Prim::I32), "bitcast<i32>({0})"),
    intrinsic!("bitcast_u32", 1, K::Bitcast(Prim::U32), "bitcast<u32>({0})"),
    intrinsic!("bitcast_f32", 1, K::Bitcast(Prim::F32), "bitcast<f32>({0})"),
    // ── linear algebra ──
    intrinsic!("dot", 2, K::Dot, "dot({0}, {1})"),
    intrinsic!("cross", 2, K::Cross, "cross({0}, {1})"),
    intrinsic!("length", 1, K::Length, "length({0})"),
    intrinsic!("norm", 1, K::Length, "length({0})"),
    intrinsic!("normalize", 1, K::Normalize, "normalize({0})"),
    intrinsic!("normalized", 1, K::Normalize, "normalize({0})"),
    intrinsic!("norm_sqr", 1, K::NormSqr, "dot({0}, {0})"),
    intrinsic!("transpose", 1, K::Transpose, "transpose({0})"),
    intrinsic!("determinant", 1, K::Determinant, "determinant({0})"),
    intrinsic!("matmul", 2, K::Matmul, ""),
    intrinsic!("outer_product", 2, K::OuterProduct, ""),
    intrinsic!("sum", 1, K::Sum, ""),
    intrinsic!("concat", 2, K::Concat, ""),
    // ── atomics ──
    intrinsic!("atomicAdd", 2, K::Atomic(AtomicKind::Add), ""),
    intrinsic!("atomicSub", 2, K::Atomic(AtomicKind::Sub), ""),
    intrinsic!("atomicMin", 2, K::Atomic(AtomicKind::Min), ""),
    intrinsic!("atomicMax", 2, K::Atomic(AtomicKind::Max), ""),
    intrinsic!("atomicAnd", 2, K::Atomic(AtomicKind::And), ""),
    intrinsic!("atomicOr", 2, K::Atomic(AtomicKind::Or), ""),
    intrinsic!("atomicXor", 2, K::Atomic(AtomicKind::Xor), ""),
    intrinsic!("atomic_add", 2, K::Atomic(AtomicKind::Add), ""),
    intrinsic!("atomic_sub", 2, K::Atomic(AtomicKind::Sub), ""),
    intrinsic!("atomic_min", 2, K::Atomic(AtomicKind::Min), ""),
    intrinsic!("atomic_max", 2, K::Atomic(AtomicKind::Max), ""),
    intrinsic!("atomic_and", 2, K::Atomic(AtomicKind::And), ""),
    intrinsic!("atomic_or", 2, K::Atomic(AtomicKind::Or), ""),
    intrinsic!("atomic_xor", 2, K::Atomic(AtomicKind::Xor), ""),
    // ── misc ──
    intrinsic!("random", 0, K::Random, ""),
    intrinsic!("textureLoad", 2, K::TextureLoad, ""),
    intrinsic!("textureStore", 3, K::TextureStore, ""),
    intrinsic!("textureSample", 2, K::TextureSample, ""),
    intrinsic!("static", 1, K::Static, ""),
];

/// Look up an intrinsic by name, accepting `ti.` and `Math.` prefixes.
pub fn lookup(name: &str) -> Option<&'static Intrinsic> {
    let bare = name
        .strip_prefix("ti.")
        .or_else(|| name.strip_prefix("Math."))
        .unwrap_or(name);
    INTRINSICS.iter().find(|i| i.name == bare)
}

/// Named constants: `Math.PI`, `ti.PI`, `Math.E`.
pub fn constant(path: &str) -> Option<f32> {
    match path {
        "Math.PI" | "ti.PI" => Some(std::f32::consts::PI),
        "Math.E" | "ti.E" => Some(std::f32::consts::E),
        _ => None,
    }
}

impl Intrinsic {
    /// Fill the WGSL template with argument expressions.
    pub fn render(&self, args: &[String]) -> String {
        let mut out = self.template.to_string();
        for (i, arg) in args.iter().enumerate() {
            out = out.replace(&format!("{{{}}}", i), arg);
        }
        out
    }

    /// Type rules for intrinsics lowered to a `Call` statement.
    pub fn signature(&self, args: &[Type]) -> Result<Signature, TypeError> {
        let invalid = |ty: &Type| TypeError::InvalidOperand {
            op: self.name.to_string(),
            ty: ty.clone(),
        };
        let first = args.first().cloned().unwrap_or(crate::types::F32);
        if let Some(bad) = args.iter().find(|t| t.is_struct()) {
            return Err(invalid(bad));
        }

        match self.kind {
            K::Float | K::Same | K::Sign => {
                let mut shape = first.clone();
                for ty in &args[1..] {
                    shape = broadcast(&shape, ty)?;
                }
                if shape.is_matrix() {
                    return Err(invalid(&shape));
                }
                let operand = match self.kind {
                    K::Float => shape.with_prim(Prim::F32),
                    _ => shape,
                };
                if self.kind == K::Sign && operand.prim() == Some(Prim::U32) {
                    return Err(invalid(&operand));
                }
                let ret = match self.kind {
                    K::Sign => operand.with_prim(Prim::I32),
                    _ => operand.clone(),
                };
                Ok(Signature {
                    args: vec![operand; args.len()],
                    ret,
                })
            }
            K::Dot => {
                let shape = broadcast(&args[0], &args[1])?;
                match shape {
                    Type::Vector(prim, _) => Ok(Signature {
                        args: vec![shape.clone(), shape],
                        ret: Type::Scalar(prim),
                    }),
                    other => Err(invalid(&other)),
                }
            }
            K::NormSqr => match &first {
                Type::Vector(prim, _) => Ok(Signature {
                    args: vec![first.clone()],
                    ret: Type::Scalar(*prim),
                }),
                other => Err(invalid(other)),
            },
            K::Length | K::Normalize => match &first {
                Type::Vector(_, _) => {
                    let operand = first.with_prim(Prim::F32);
                    let ret = if self.kind == K::Length {
                        crate::types::F32
                    } else {
                        operand.clone()
                    };
                    Ok(Signature {
                        args: vec![operand],
                        ret,
                    })
                }
                other => Err(invalid(other)),
            },
            K::Cross => {
                let shape = broadcast(&args[0], &args[1])?;
                if shape.is_vector() && shape.component_count() == 3 {
                    let operand = shape.with_prim(Prim::F32);
                    Ok(Signature {
                        args: vec![operand.clone(), operand.clone()],
                        ret: operand,
                    })
                } else {
                    Err(invalid(&shape))
                }
            }
            K::Transpose => match first {
                Type::Matrix(prim, n, m) => Ok(Signature {
                    args: vec![first.clone()],
                    ret: Type::Matrix(prim, m, n),
                }),
                other => Err(invalid(&other)),
            },
            K::Determinant => match first {
                Type::Matrix(_, n, m) if n == m => Ok(Signature {
                    args: vec![first.clone()],
                    ret: crate::types::F32,
                }),
                other => Err(invalid(&other)),
            },
            K::Cast(prim) | K::Bitcast(prim) => {
                if first.is_matrix() {
                    return Err(invalid(&first));
                }
                Ok(Signature {
                    args: vec![first.clone()],
                    ret: first.with_prim(prim),
                })
            }
            _ => Err(invalid(&first)),
        }
    }
}

// ─── Library functions ───────────────────────────────────────────

/// A helper written in the kernel language.
#[derive(Debug)]
pub struct LibraryFunction {
    pub name: &'static str,
    pub source: &'static str,
}

pub static LIBRARY: &[LibraryFunction] = &[
    LibraryFunction {
        name: "polarDecompose2D",
        source: r#"
(A, U, P) => {
    let x = A[0, 0] + A[1, 1]
    let y = A[1, 0] - A[0, 1]
    let inv = 1.0 / sqrt(x * x + y * y)
    let c = x * inv
    let s = y * inv
    let R = [[c, -s], [s, c]]
    U = R
    P = R.transpose().matmul(A)
}
"#,
    },
    LibraryFunction {
        name: "svd2D",
        source: r#"
(A, U, E, V) => {
    let R = [[0.0, 0.0], [0.0, 0.0]]
    let S = [[0.0, 0.0], [0.0, 0.0]]
    polarDecompose2D(A, R, S)
    let c = 0.0
    let s = 0.0
    let s1 = 0.0
    let s2 = 0.0
    if (abs(S[0, 1]) < 1e-5) {
        c = 1.0
        s1 = S[0, 0]
        s2 = S[1, 1]
    } else {
        let tau = 0.5 * (S[0, 0] - S[1, 1])
        let w = sqrt(tau * tau + S[0, 1] * S[0, 1])
        let t = 0.0
        if (tau > 0) {
            t = S[0, 1] / (tau + w)
        } else {
            t = S[0, 1] / (tau - w)
        }
        c = 1.0 / sqrt(t * t + 1.0)
        s = -t * c
        s1 = c * c * S[0, 0] - 2.0 * c * s * S[0, 1] + s * s * S[1, 1]
        s2 = s * s * S[0, 0] + 2.0 * c * s * S[0, 1] + c * c * S[1, 1]
    }
    if (s1 < s2) {
        let tmp = s1
        s1 = s2
        s2 = tmp
        V = [[-s, c], [-c, -s]]
    } else {
        V = [[c, s], [-s, c]]
    }
    U = R.matmul(V)
    E = [[s1, 0.0], [0.0, s2]]
}
"#,
    },
    LibraryFunction {
        name: "lookAt",
        source: r#"
(eye, center, up) => {
    let z = normalize(eye - center)
    let x = normalize(cross(up, z))
    let y = normalize(cross(z, x))
    return [
        [x.x, x.y, x.z, -dot(x, eye)],
        [y.x, y.y, y.z, -dot(y, eye)],
        [z.x, z.y, z.z, -dot(z, eye)],
        [0.0, 0.0, 0.0, 1.0]
    ]
}
"#,
    },
    LibraryFunction {
        name: "perspective",
        source: r#"
(fovy, aspect, near, far) => {
    let t = tan(fovy * Math.PI / 360.0)
    let m = [
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0]
    ]
    m[0, 0] = 1.0 / (aspect * t)
    m[1, 1] = 1.0 / t
    m[2, 2] = -(far + near) / (far - near)
    m[2, 3] = -(2.0 * far * near) / (far - near)
    m[3, 2] = -1.0
    return m
}
"#,
    },
    LibraryFunction {
        name: "inverse",
        source: r#"
(m) => {
    let c00 = m[1, 1] * m[2, 2] - m[2, 1] * m[1, 2]
    let c01 = m[1, 0] * m[2, 2] - m[1, 2] * m[2, 0]
    let c02 = m[1, 0] * m[2, 1] - m[1, 1] * m[2, 0]
    let inv = 1.0 / (m[0, 0] * c00 - m[0, 1] * c01 + m[0, 2] * c02)
    return [
        [c00 * inv, (m[0, 2] * m[2, 1] - m[0, 1] * m[2, 2]) * inv, (m[0, 1] * m[1, 2] - m[0, 2] * m[1, 1]) * inv],
        [-c01 * inv, (m[0, 0] * m[2, 2] - m[0, 2] * m[2, 0]) * inv, (m[1, 0] * m[0, 2] - m[0, 0] * m[1, 2]) * inv],
        [c02 * inv, (m[2, 0] * m[0, 1] - m[0, 0] * m[2, 1]) * inv, (m[0, 0] * m[1, 1] - m[1, 0] * m[0, 1]) * inv]
    ]
}
"#,
    },
];

pub fn library_function(name: &str) -> Option<&'static LibraryFunction> {
    let bare = name.strip_prefix("ti.").unwrap_or(name);
    LIBRARY.iter().find(|f| f.name == bare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{F32, I32};

    #[test]
    fn test_lookup_prefixes() {
        assert_eq!(lookup("sin").map(|i| i.name), Some("sin"));
        assert_eq!(lookup("ti.sqrt").map(|i| i.name), Some("sqrt"));
        assert_eq!(lookup("Math.max").map(|i| i.kind), Some(K::Same));
        assert!(lookup("ti.nope").is_none());
        assert_eq!(
            lookup("ti.atomic_add").map(|i| i.kind),
            Some(K::Atomic(AtomicKind::Add))
        );
    }

    #[test]
    fn test_names_are_unique() {
        for (i, a) in INTRINSICS.iter().enumerate() {
            assert!(
                INTRINSICS[i + 1..].iter().all(|b| b.name != a.name),
                "duplicate intrinsic {}",
                a.name
            );
        }
    }

    #[test]
    fn test_render_template() {
        let atan2 = lookup("atan2").unwrap();
        assert_eq!(atan2.render(&["y".into(), "x".into()]), "atan2(y, x)");
        let norm_sqr = lookup("norm_sqr").unwrap();
        assert_eq!(norm_sqr.render(&["v".into()]), "dot(v, v)");
    }

    #[test]
    fn test_float_signature_widens() {
        let sig = lookup("sin").unwrap().signature(&[I32]).unwrap();
        assert_eq!(sig.args, vec![F32]);
        assert_eq!(sig.ret, F32);
        let v3 = Type::Vector(Prim::F32, 3);
        let sig = lookup("mix").unwrap().signature(&[v3.clone(), v3.clone(), F32]).unwrap();
        assert_eq!(sig.args, vec![v3.clone(), v3.clone(), v3.clone()]);
        assert_eq!(sig.ret, v3);
    }

    #[test]
    fn test_same_and_sign_keep_integers() {
        let sig = lookup("max").unwrap().signature(&[I32, I32]).unwrap();
        assert_eq!(sig.ret, I32);
        let sig = lookup("sign").unwrap().signature(&[F32]).unwrap();
        assert_eq!(sig.ret, I32);
    }

    #[test]
    fn test_linear_algebra_signatures() {
        let v2 = Type::Vector(Prim::F32, 2);
        let v3i = Type::Vector(Prim::I32, 3);
        assert_eq!(lookup("dot").unwrap().signature(&[v2.clone(), v2.clone()]).unwrap().ret, F32);
        assert_eq!(lookup("length").unwrap().signature(&[v3i.clone()]).unwrap().ret, F32);
        assert!(matches!(
            lookup("cross").unwrap().signature(&[v2.clone(), v2.clone()]),
            Err(TypeError::InvalidOperand { .. })
        ));
        assert!(matches!(
            lookup("dot").unwrap().signature(&[v2, v3i]),
            Err(TypeError::ShapeMismatch { .. })
        ));
        let m = Type::Matrix(Prim::F32, 2, 3);
        assert_eq!(
            lookup("transpose").unwrap().signature(&[m.clone()]).unwrap().ret,
            Type::Matrix(Prim::F32, 3, 2)
        );
        assert!(lookup("determinant").unwrap().signature(&[m]).is_err());
    }

    #[test]
    fn test_library_sources_parse() {
        for func in LIBRARY {
            let decl = crate::syntax::parse_function(func.source, LIBRARY_FILE);
            assert!(decl.is_ok(), "{} failed to parse: {:?}", func.name, decl.err());
        }
        assert!(library_function("ti.lookAt").is_some());
    }

    #[test]
    fn test_math_constants() {
        assert_eq!(constant("Math.PI"), Some(std::f32::consts::PI));
        assert_eq!(constant("Math.TAU"), None);
    }
}
