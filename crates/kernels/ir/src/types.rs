//! Type promotion rules.
//!
//! Operator result kinds come from the explicit table below, never from a
//! target language's implicit conversions. The table is total over
//! [`ScalarKind`]: every pair either has a documented result or is `None`,
//! and `None` becomes a [`TypeError`] at graph construction.
//!
//! | ⊕      | Int  | UInt | Long | Float | Double | Real   |
//! |--------|------|------|------|-------|--------|--------|
//! | Int    | Int  | UInt | Long | Float | Double | Real   |
//! | UInt   | UInt | UInt | Long | Float | Double | Real   |
//! | Long   | Long | Long | Long | Double| Double | Real   |
//! | Float  | Float| Float| Double| Float| Double | Float  |
//! | Double | Double| Double| Double| Double| Double| Double |
//! | Real   | Real | Real | Real | Float | Double | Real   |
//!
//! `Bool` takes part in no arithmetic promotion.

use tessera_foundation::ScalarKind;

use crate::error::TypeError;

const N: Option<ScalarKind> = None;
const I: Option<ScalarKind> = Some(ScalarKind::Int);
const U: Option<ScalarKind> = Some(ScalarKind::UInt);
const L: Option<ScalarKind> = Some(ScalarKind::Long);
const F: Option<ScalarKind> = Some(ScalarKind::Float);
const D: Option<ScalarKind> = Some(ScalarKind::Double);
const R: Option<ScalarKind> = Some(ScalarKind::Real);

/// Arithmetic promotion, indexed by [`ScalarKind::index`].
pub const PROMOTION: [[Option<ScalarKind>; 7]; 7] = [
    //   Bool Int UInt Long Float Double Real
    [N, N, N, N, N, N, N], // Bool
    [N, I, U, L, F, D, R], // Int
    [N, U, U, L, F, D, R], // UInt
    [N, L, L, L, D, D, R], // Long
    [N, F, F, D, F, D, F], // Float
    [N, D, D, D, D, D, D], // Double
    [N, R, R, R, F, D, R], // Real
];

/// Arithmetic promotion of two operand kinds.
pub fn promote(a: ScalarKind, b: ScalarKind) -> Option<ScalarKind> {
    PROMOTION[a.index()][b.index()]
}

/// Result of `+ - * / min max clamp`.
pub fn arithmetic(op: &'static str, a: ScalarKind, b: ScalarKind) -> Result<ScalarKind, TypeError> {
    promote(a, b).ok_or_else(|| TypeError::new(op, &[a, b], "no arithmetic promotion"))
}

/// Result of `%`: integer operands only.
pub fn integral(op: &'static str, a: ScalarKind, b: ScalarKind) -> Result<ScalarKind, TypeError> {
    match promote(a, b) {
        Some(kind) if kind.is_integer() => Ok(kind),
        _ => Err(TypeError::new(op, &[a, b], "integer operands required")),
    }
}

/// Result of `== != < <= > >=`: operands must promote, the result is `Bool`.
pub fn comparison(op: &'static str, a: ScalarKind, b: ScalarKind) -> Result<ScalarKind, TypeError> {
    arithmetic(op, a, b).map(|_| ScalarKind::Bool)
}

/// Result of `&& ||`.
pub fn logical(op: &'static str, a: ScalarKind, b: ScalarKind) -> Result<ScalarKind, TypeError> {
    if a == ScalarKind::Bool && b == ScalarKind::Bool {
        Ok(ScalarKind::Bool)
    } else {
        Err(TypeError::new(op, &[a, b], "boolean operands required"))
    }
}

/// Result of transcendental functions: floating operand, same kind out.
pub fn floating(op: &'static str, a: ScalarKind) -> Result<ScalarKind, TypeError> {
    if a.is_floating() {
        Ok(a)
    } else {
        Err(TypeError::new(op, &[a], "floating operand required"))
    }
}

/// Result of a function over several operands that must promote to a
/// floating kind (`pow`, `atan2`, `fma`).
pub fn floating_n(op: &'static str, kinds: &[ScalarKind]) -> Result<ScalarKind, TypeError> {
    let promoted = promote_all(op, kinds)?;
    if promoted.is_floating() {
        Ok(promoted)
    } else {
        Err(TypeError::new(op, kinds, "operands must promote to a floating kind"))
    }
}

/// Arithmetic promotion folded over any number of operands.
pub fn promote_all(op: &'static str, kinds: &[ScalarKind]) -> Result<ScalarKind, TypeError> {
    let (&first, rest) = kinds
        .split_first()
        .ok_or_else(|| TypeError::new(op, kinds, "at least one operand required"))?;
    rest.iter().try_fold(first, |acc, &k| {
        promote(acc, k).ok_or_else(|| TypeError::new(op, kinds, "no arithmetic promotion"))
    })
}

/// Result of `abs`.
pub fn numeric(op: &'static str, a: ScalarKind) -> Result<ScalarKind, TypeError> {
    if a.is_numeric() {
        Ok(a)
    } else {
        Err(TypeError::new(op, &[a], "numeric operand required"))
    }
}

/// Result of unary minus: signed numeric kinds.
pub fn negation(op: &'static str, a: ScalarKind) -> Result<ScalarKind, TypeError> {
    if a.is_numeric() && a != ScalarKind::UInt {
        Ok(a)
    } else {
        Err(TypeError::new(op, &[a], "signed numeric operand required"))
    }
}

/// Result of logical not.
pub fn boolean(op: &'static str, a: ScalarKind) -> Result<ScalarKind, TypeError> {
    if a == ScalarKind::Bool {
        Ok(a)
    } else {
        Err(TypeError::new(op, &[a], "boolean operand required"))
    }
}

/// Result of `select(cond, on_true, on_false)`.
pub fn select(cond: ScalarKind, on_true: ScalarKind, on_false: ScalarKind) -> Result<ScalarKind, TypeError> {
    let operands = [cond, on_true, on_false];
    if cond != ScalarKind::Bool {
        return Err(TypeError::new("select", &operands, "condition must be boolean"));
    }
    if on_true == ScalarKind::Bool && on_false == ScalarKind::Bool {
        return Ok(ScalarKind::Bool);
    }
    promote(on_true, on_false)
        .ok_or_else(|| TypeError::new("select", &operands, "branches do not promote"))
}

/// Whether a value of kind `src` may be stored into a buffer of kind `dest`
/// without an explicit conversion node.
pub fn assignable(src: ScalarKind, dest: ScalarKind) -> bool {
    src == dest || (src == ScalarKind::Real && dest.is_floating())
}
