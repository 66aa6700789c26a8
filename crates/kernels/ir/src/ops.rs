//! Node builders.
//!
//! Every builder checks operand kinds against [`crate::types`] and returns
//! a [`TypeError`] instead of a node when no rule covers them. Leaves
//! cannot fail.

use std::sync::Arc;

use tessera_foundation::{BufferRef, ScalarKind, ScalarValue};

use crate::error::TypeError;
use crate::node::{BinaryOp, Builtin, Expr, NodeKind, Parameter, UnaryOp};
use crate::types;

// === Leaves ===

/// Literal of an explicit kind; the value is cast to that kind.
pub fn literal(kind: ScalarKind, value: ScalarValue) -> Expr {
    let value = match kind {
        ScalarKind::Real => ScalarValue::Float(value.as_f64()),
        other => value.cast(other),
    };
    Expr::from_parts(NodeKind::Literal(value), kind)
}

/// Precision-dependent floating literal.
pub fn real(value: f64) -> Expr {
    literal(ScalarKind::Real, ScalarValue::Float(value))
}

pub fn float(value: f32) -> Expr {
    literal(ScalarKind::Float, ScalarValue::Float(f64::from(value)))
}

pub fn double(value: f64) -> Expr {
    literal(ScalarKind::Double, ScalarValue::Float(value))
}

pub fn int(value: i32) -> Expr {
    literal(ScalarKind::Int, ScalarValue::Int(i64::from(value)))
}

pub fn uint(value: u32) -> Expr {
    literal(ScalarKind::UInt, ScalarValue::Int(i64::from(value)))
}

pub fn long(value: i64) -> Expr {
    literal(ScalarKind::Long, ScalarValue::Int(value))
}

pub fn boolean(value: bool) -> Expr {
    literal(ScalarKind::Bool, ScalarValue::Bool(value))
}

/// Reference to a run-time parameter. Every node built from the same
/// [`Parameter`] binds the same kernel argument.
pub fn param(parameter: &Parameter) -> Expr {
    Expr::from_parts(NodeKind::Parameter(parameter.clone()), parameter.kind())
}

/// Element `index` of `buffer`.
pub fn buffer(buffer: &BufferRef) -> Expr {
    buffer_at(buffer, 0)
}

/// Element `index + offset` of `buffer`.
pub fn buffer_at(buffer: &BufferRef, offset: i64) -> Expr {
    Expr::from_parts(
        NodeKind::Buffer {
            buffer: Arc::clone(buffer),
            offset,
        },
        buffer.kind(),
    )
}

/// The global element index, as `Int`.
pub fn index() -> Expr {
    Expr::from_parts(NodeKind::Index, ScalarKind::Int)
}

// === Operators ===

pub fn unary(op: UnaryOp, arg: &Expr) -> Result<Expr, TypeError> {
    let name = op.name();
    let ty = match op {
        UnaryOp::Neg => types::negation(name, arg.ty())?,
        UnaryOp::Not => types::boolean(name, arg.ty())?,
        UnaryOp::Abs => types::numeric(name, arg.ty())?,
        _ => types::floating(name, arg.ty())?,
    };
    Ok(Expr::from_parts(NodeKind::Unary { op, arg: arg.clone() }, ty))
}

pub fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Expr, TypeError> {
    let name = op.name();
    let (a, b) = (lhs.ty(), rhs.ty());
    let ty = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => types::arithmetic(name, a, b)?,
        BinaryOp::Rem => types::integral(name, a, b)?,
        BinaryOp::And | BinaryOp::Or => types::logical(name, a, b)?,
        _ => types::comparison(name, a, b)?,
    };
    Ok(Expr::from_parts(
        NodeKind::Binary {
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        },
        ty,
    ))
}

/// `cond ? on_true : on_false`, evaluated per element.
pub fn select(cond: &Expr, on_true: &Expr, on_false: &Expr) -> Result<Expr, TypeError> {
    let ty = types::select(cond.ty(), on_true.ty(), on_false.ty())?;
    Ok(Expr::from_parts(
        NodeKind::Select {
            cond: cond.clone(),
            on_true: on_true.clone(),
            on_false: on_false.clone(),
        },
        ty,
    ))
}

/// Explicit conversion. Converting a node to its own kind returns it as is.
pub fn convert(arg: &Expr, kind: ScalarKind) -> Expr {
    if arg.ty() == kind {
        return arg.clone();
    }
    Expr::from_parts(NodeKind::Convert { arg: arg.clone() }, kind)
}

pub fn call(func: Builtin, args: &[Expr]) -> Result<Expr, TypeError> {
    let name = func.name();
    let kinds: Vec<ScalarKind> = args.iter().map(Expr::ty).collect();
    if kinds.len() != func.arity() {
        return Err(TypeError::new(
            name,
            &kinds,
            format!("expected {} arguments", func.arity()),
        ));
    }
    let ty = match func {
        Builtin::Min | Builtin::Max | Builtin::Clamp => types::promote_all(name, &kinds)?,
        Builtin::Pow | Builtin::Atan2 | Builtin::Fma => types::floating_n(name, &kinds)?,
    };
    Ok(Expr::from_parts(
        NodeKind::Call {
            func,
            args: args.to_vec(),
        },
        ty,
    ))
}

/// Source passthrough typed as `kind`.
///
/// The template is emitted verbatim with `{0}`, `{1}`, ... replaced by the
/// rendered arguments. Only devices that compile source text accept raw
/// nodes.
pub fn raw(template: &str, kind: ScalarKind, args: &[Expr]) -> Result<Expr, TypeError> {
    let kinds: Vec<ScalarKind> = args.iter().map(Expr::ty).collect();
    for slot in placeholders(template) {
        if slot >= args.len() {
            return Err(TypeError::new(
                "raw",
                &kinds,
                format!("placeholder {{{slot}}} has no argument"),
            ));
        }
    }
    Ok(Expr::from_parts(
        NodeKind::Raw {
            template: Arc::from(template),
            args: args.to_vec(),
        },
        kind,
    ))
}

/// Indices of `{N}` placeholders in a raw template, in text order.
pub(crate) fn placeholders(template: &str) -> impl Iterator<Item = usize> + '_ {
    template.split('{').skip(1).filter_map(|piece| {
        let (digits, _) = piece.split_once('}')?;
        digits.parse().ok()
    })
}

macro_rules! binary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(lhs: &Expr, rhs: &Expr) -> Result<Expr, TypeError> {
                binary(BinaryOp::$op, lhs, rhs)
            }
        )*
    };
}

macro_rules! unary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(arg: &Expr) -> Result<Expr, TypeError> {
                unary(UnaryOp::$op, arg)
            }
        )*
    };
}

binary_builders! {
    add => Add, sub => Sub, mul => Mul, div => Div, rem => Rem,
    eq => Eq, ne => Ne, lt => Lt, le => Le, gt => Gt, ge => Ge,
    and => And, or => Or,
}

unary_builders! {
    neg => Neg, not => Not, abs => Abs, sin => Sin, cos => Cos, tan => Tan,
    exp => Exp, log => Log, sqrt => Sqrt, floor => Floor,
}

pub fn min(a: &Expr, b: &Expr) -> Result<Expr, TypeError> {
    call(Builtin::Min, &[a.clone(), b.clone()])
}

pub fn max(a: &Expr, b: &Expr) -> Result<Expr, TypeError> {
    call(Builtin::Max, &[a.clone(), b.clone()])
}

pub fn pow(base: &Expr, exponent: &Expr) -> Result<Expr, TypeError> {
    call(Builtin::Pow, &[base.clone(), exponent.clone()])
}

/// `a * b + c` with a single rounding.
pub fn fma(a: &Expr, b: &Expr, c: &Expr) -> Result<Expr, TypeError> {
    call(Builtin::Fma, &[a.clone(), b.clone(), c.clone()])
}

pub fn clamp(x: &Expr, lo: &Expr, hi: &Expr) -> Result<Expr, TypeError> {
    call(Builtin::Clamp, &[x.clone(), lo.clone(), hi.clone()])
}
