//! Expression nodes.
//!
//! An [`Expr`] is a cheap, clonable handle to an immutable [`Node`]. Sharing
//! a handle shares the node, so graphs are DAGs by construction: a node can
//! only reference children that already exist. Node identity (the address
//! of the shared allocation) is what the renderer memoizes on and what the
//! kernel compiler counts uses of.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use tessera_foundation::{BufferRef, ParamId, ScalarKind, ScalarValue};

/// Identity of a node within a live graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle to an immutable expression node.
#[derive(Clone)]
pub struct Expr(Arc<Node>);

/// A typed, side-effect-free operation or memory reference.
pub struct Node {
    kind: NodeKind,
    ty: ScalarKind,
    hoisted: bool,
}

/// What a node computes.
#[derive(Clone)]
pub enum NodeKind {
    /// Constant inlined into the kernel source.
    Literal(ScalarValue),
    /// Constant passed as a kernel argument.
    Parameter(Parameter),
    /// Element `index + offset` of a buffer.
    Buffer { buffer: BufferRef, offset: i64 },
    /// The global element index.
    Index,
    Unary { op: UnaryOp, arg: Expr },
    Binary { op: BinaryOp, lhs: Expr, rhs: Expr },
    Select { cond: Expr, on_true: Expr, on_false: Expr },
    /// Explicit conversion to the node's kind.
    Convert { arg: Expr },
    Call { func: Builtin, args: Vec<Expr> },
    /// Source passthrough; `{0}`, `{1}`, ... are replaced by rendered args.
    Raw { template: Arc<str>, args: Vec<Expr> },
}

impl Expr {
    pub(crate) fn from_parts(kind: NodeKind, ty: ScalarKind) -> Self {
        Self(Arc::new(Node {
            kind,
            ty,
            hoisted: false,
        }))
    }

    pub fn id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.0) as usize)
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Result kind.
    pub fn ty(&self) -> ScalarKind {
        self.0.ty
    }

    /// Whether the node must be emitted as a local declaration before use.
    pub fn is_hoisted(&self) -> bool {
        self.0.hoisted
    }

    /// A new node with the same operation and children, flagged for
    /// declaration hoisting. The original node is untouched.
    pub fn hoisted(&self) -> Expr {
        Self(Arc::new(Node {
            kind: self.0.kind.clone(),
            ty: self.0.ty,
            hoisted: true,
        }))
    }

    /// Leaves have no children and are never hoisted automatically.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self.0.kind,
            NodeKind::Literal(_) | NodeKind::Parameter(_) | NodeKind::Buffer { .. } | NodeKind::Index
        )
    }

    pub fn children(&self) -> Vec<&Expr> {
        match &self.0.kind {
            NodeKind::Literal(_) | NodeKind::Parameter(_) | NodeKind::Buffer { .. } | NodeKind::Index => {
                Vec::new()
            }
            NodeKind::Unary { arg, .. } | NodeKind::Convert { arg } => vec![arg],
            NodeKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            NodeKind::Call { args, .. } | NodeKind::Raw { args, .. } => args.iter().collect(),
        }
    }

    /// Operation tag used in structural signatures.
    pub fn tag(&self) -> &'static str {
        match &self.0.kind {
            NodeKind::Literal(_) => "lit",
            NodeKind::Parameter(_) => "par",
            NodeKind::Buffer { .. } => "buf",
            NodeKind::Index => "idx",
            NodeKind::Unary { op, .. } => op.name(),
            NodeKind::Binary { op, .. } => op.name(),
            NodeKind::Select { .. } => "select",
            NodeKind::Convert { .. } => "convert",
            NodeKind::Call { func, .. } => func.name(),
            NodeKind::Raw { .. } => "raw",
        }
    }

    /// Literal value, if this is a literal node.
    pub fn as_literal(&self) -> Option<ScalarValue> {
        match self.0.kind {
            NodeKind::Literal(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Literal(v) => write!(f, "{v:?}:{:?}", self.ty()),
            NodeKind::Parameter(p) => write!(f, "{}:{:?}", p.id(), self.ty()),
            NodeKind::Buffer { buffer, offset } => write!(f, "{}[{offset:+}]", buffer.id()),
            NodeKind::Index => f.write_str("index"),
            _ => {
                let mut t = f.debug_tuple(self.tag());
                for child in self.children() {
                    t.field(child);
                }
                t.finish()
            }
        }
    }
}

/// Run-time configurable constant.
///
/// Rendered as a kernel argument rather than a literal, so its value can
/// change between dispatches without changing the kernel signature.
#[derive(Clone)]
pub struct Parameter(Arc<ParamCell>);

struct ParamCell {
    id: ParamId,
    kind: ScalarKind,
    value: RwLock<ScalarValue>,
}

impl Parameter {
    pub fn new(kind: ScalarKind, value: ScalarValue) -> Self {
        Self(Arc::new(ParamCell {
            id: ParamId::next(),
            kind,
            value: RwLock::new(Self::normalize(kind, value)),
        }))
    }

    /// A `Real` parameter.
    pub fn real(value: f64) -> Self {
        Self::new(ScalarKind::Real, ScalarValue::Float(value))
    }

    fn normalize(kind: ScalarKind, value: ScalarValue) -> ScalarValue {
        match kind {
            ScalarKind::Real => ScalarValue::Float(value.as_f64()),
            other => value.cast(other),
        }
    }

    pub fn id(&self) -> ParamId {
        self.0.id
    }

    pub fn kind(&self) -> ScalarKind {
        self.0.kind
    }

    pub fn value(&self) -> ScalarValue {
        *self.0.value.read()
    }

    /// Update the value seen by the next dispatch.
    pub fn set(&self, value: ScalarValue) {
        *self.0.value.write() = Self::normalize(self.0.kind, value);
    }

    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("value", &self.value())
            .finish()
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    Abs,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Floor,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::Abs => "abs",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Floor => "floor",
        }
    }

    /// True for the transcendental functions that require floating input.
    pub fn is_transcendental(self) -> bool {
        matches!(
            self,
            UnaryOp::Sin
                | UnaryOp::Cos
                | UnaryOp::Tan
                | UnaryOp::Exp
                | UnaryOp::Log
                | UnaryOp::Sqrt
                | UnaryOp::Floor
        )
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Infix symbol shared by both dialects.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Generic builtin functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Min,
    Max,
    Pow,
    Atan2,
    Fma,
    Clamp,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Pow => "pow",
            Builtin::Atan2 => "atan2",
            Builtin::Fma => "fma",
            Builtin::Clamp => "clamp",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Min | Builtin::Max | Builtin::Pow | Builtin::Atan2 => 2,
            Builtin::Fma | Builtin::Clamp => 3,
        }
    }
}
