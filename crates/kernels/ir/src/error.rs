//! Graph construction errors.

use thiserror::Error;

use tessera_foundation::ScalarKind;

/// An operator was applied to operands its rule table does not cover.
///
/// Raised while the graph is being built, never at render time: a graph
/// that exists is well-typed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type error in `{op}` over {operands:?}: {message}")]
pub struct TypeError {
    /// Operator or builder name.
    pub op: &'static str,
    /// Operand kinds in argument order (empty for arity errors).
    pub operands: Vec<ScalarKind>,
    pub message: String,
}

impl TypeError {
    pub fn new(op: &'static str, operands: &[ScalarKind], message: impl Into<String>) -> Self {
        Self {
            op,
            operands: operands.to_vec(),
            message: message.into(),
        }
    }

    /// Component-count mismatch between vector expressions.
    pub fn arity(op: &'static str, expected: usize, found: usize) -> Self {
        Self {
            op,
            operands: Vec::new(),
            message: format!("expected {expected} components, found {found}"),
        }
    }
}
