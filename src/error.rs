use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::reflect::ReflectionError;
use crate::syntax::span::Span;
use crate::types::{Type, TypeError};

/// A failed kernel compile. Every variant points at kernel source.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("kernel source does not parse")]
    Parse(Vec<Diagnostic>),

    #[error("{what} is not supported in kernels")]
    UnsupportedSyntax { what: String, span: Span },

    #[error("unresolved symbol `{name}`")]
    UnresolvedSymbol { name: String, span: Span },

    #[error("shape mismatch between {lhs} and {rhs}")]
    ShapeMismatch { lhs: Type, rhs: Type, span: Span },

    #[error("{ty} has no field `{name}`")]
    UnknownField { name: String, ty: String, span: Span },

    #[error("operator `{op}` cannot be applied to {ty}")]
    InvalidOperand { op: String, ty: String, span: Span },

    #[error("invalid type: {message}")]
    InvalidType { message: String, span: Span },

    #[error("recursive call to `{name}`")]
    RecursionDetected { name: String, span: Span },

    #[error("{what} must be a compile-time constant")]
    NotConstant { what: String, span: Span },

    #[error("`{name}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("cannot assign to {what}")]
    InvalidAssignment { what: String, span: Span },

    #[error("{message}")]
    InvalidControlFlow { message: String, span: Span },

    #[error("static loop runs {count} iterations, more than the limit of {limit}")]
    UnrollLimitExceeded { count: u64, limit: u32, span: Span },

    #[error("function calls nest deeper than {limit}")]
    InlineDepthExceeded { limit: u32, span: Span },

    #[error("generated shader failed reflection: {0}")]
    Reflection(#[from] ReflectionError),
}

impl CompileError {
    pub fn from_type(err: TypeError, span: Span) -> Self {
        match err {
            TypeError::ShapeMismatch { lhs, rhs } => CompileError::ShapeMismatch { lhs, rhs, span },
            TypeError::UnknownField { name, ty } => CompileError::UnknownField {
                name,
                ty: ty.to_string(),
                span,
            },
            TypeError::InvalidOperand { op, ty } => CompileError::InvalidOperand {
                op,
                ty: ty.to_string(),
                span,
            },
            other @ TypeError::InvalidSize { .. } => CompileError::InvalidType {
                message: other.to_string(),
                span,
            },
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Parse(diags) => diags.first().map(|d| d.span),
            CompileError::Reflection(_) => None,
            CompileError::UnsupportedSyntax { span, .. }
            | CompileError::UnresolvedSymbol { span, .. }
            | CompileError::ShapeMismatch { span, .. }
            | CompileError::UnknownField { span, .. }
            | CompileError::InvalidOperand { span, .. }
            | CompileError::InvalidType { span, .. }
            | CompileError::RecursionDetected { span, .. }
            | CompileError::NotConstant { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::InvalidAssignment { span, .. }
            | CompileError::InvalidControlFlow { span, .. }
            | CompileError::UnrollLimitExceeded { span, .. }
            | CompileError::InlineDepthExceeded { span, .. } => Some(*span),
        }
    }

    /// Replace the span; used to point errors in inlined helpers at the call.
    pub(crate) fn relocate(mut self, site: Span, callee: &str) -> Self {
        let note = format!("raised inside `{}`", callee);
        match &mut self {
            CompileError::Parse(diags) => {
                for d in diags.iter_mut() {
                    d.span = site;
                    d.notes.push(note.clone());
                }
            }
            CompileError::Reflection(_) => {}
            CompileError::UnsupportedSyntax { span, .. }
            | CompileError::UnresolvedSymbol { span, .. }
            | CompileError::ShapeMismatch { span, .. }
            | CompileError::UnknownField { span, .. }
            | CompileError::InvalidOperand { span, .. }
            | CompileError::InvalidType { span, .. }
            | CompileError::RecursionDetected { span, .. }
            | CompileError::NotConstant { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::InvalidAssignment { span, .. }
            | CompileError::InvalidControlFlow { span, .. }
            | CompileError::UnrollLimitExceeded { span, .. }
            | CompileError::InlineDepthExceeded { span, .. } => *span = site,
        }
        self
    }

    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        let span = self.span().unwrap_or_else(Span::dummy);
        let diag = Diagnostic::error(self.to_string(), span);
        let diag = match self {
            CompileError::Parse(diags) => return diags.clone(),
            CompileError::ShapeMismatch { .. } => diag.with_help(
                "scalars broadcast to any shape; vectors and matrices must agree exactly"
                    .to_string(),
            ),
            CompileError::RecursionDetected { .. } => {
                diag.with_note("helper functions are inlined, so recursion cannot terminate".to_string())
            }
            CompileError::NotConstant { .. } => diag.with_help(
                "only literals, scope constants and static loop indices are known at compile time"
                    .to_string(),
            ),
            CompileError::UnrollLimitExceeded { .. } => {
                diag.with_help("drop the static marker to emit a device loop".to_string())
            }
            _ => diag,
        };
        vec![diag]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Prim, I32};

    #[test]
    fn test_from_type_error_keeps_span() {
        let span = Span::new(0, 4, 9);
        let err = CompileError::from_type(
            TypeError::ShapeMismatch {
                lhs: Type::Vector(Prim::F32, 2),
                rhs: Type::Vector(Prim::F32, 3),
            },
            span,
        );
        assert_eq!(err.span(), Some(span));
        assert_eq!(err.to_string(), "shape mismatch between vec2<f32> and vec3<f32>");
        let diags = err.to_diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].help.is_some());
    }

    #[test]
    fn test_relocate_points_at_call_site() {
        let err = CompileError::InvalidOperand {
            op: "~".into(),
            ty: I32.to_string(),
            span: Span::new(1, 100, 101),
        };
        let site = Span::new(0, 3, 7);
        assert_eq!(err.relocate(site, "inverse").span(), Some(site));
    }

    #[test]
    fn test_parse_errors_pass_through() {
        let diag = Diagnostic::error("expected ')'".into(), Span::new(0, 1, 2));
        let err = CompileError::Parse(vec![diag.clone()]);
        assert_eq!(err.to_diagnostics(), vec![diag]);
    }
}
