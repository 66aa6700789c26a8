//! Scalar kinds and host values.
//!
//! [`ScalarKind`] is the type lattice the expression layer promotes over.
//! `Real` is the one kind without a fixed width: it renders as single or
//! double precision depending on the kernel configuration, so the same
//! graph can be compiled for devices with and without `f64` support.

use serde::{Deserialize, Serialize};

use crate::memory::HostData;

/// Element kind of an expression node or buffer.
///
/// The declaration order is significant: it is the row/column order of
/// the promotion table in the expression layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 32-bit unsigned integer.
    UInt,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Floating kind whose width is chosen by [`Precision`] at render time.
    Real,
}

impl ScalarKind {
    /// Every kind, in table order.
    pub const ALL: [ScalarKind; 7] = [
        ScalarKind::Bool,
        ScalarKind::Int,
        ScalarKind::UInt,
        ScalarKind::Long,
        ScalarKind::Float,
        ScalarKind::Double,
        ScalarKind::Real,
    ];

    /// Row/column index into promotion tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::UInt | ScalarKind::Long)
    }

    pub const fn is_floating(self) -> bool {
        matches!(self, ScalarKind::Float | ScalarKind::Double | ScalarKind::Real)
    }

    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    /// Kinds a [`MemoryBuffer`](crate::MemoryBuffer) can hold.
    pub const fn is_storable(self) -> bool {
        matches!(
            self,
            ScalarKind::Int
                | ScalarKind::UInt
                | ScalarKind::Long
                | ScalarKind::Float
                | ScalarKind::Double
        )
    }

    /// Size of one element in bytes, after resolving `Real` by precision.
    pub const fn size_bytes(self, precision: Precision) -> usize {
        match self.resolve(precision) {
            ScalarKind::Bool | ScalarKind::Int | ScalarKind::UInt | ScalarKind::Float => 4,
            _ => 8,
        }
    }

    /// Replace `Real` with the concrete floating kind for `precision`.
    pub const fn resolve(self, precision: Precision) -> ScalarKind {
        match (self, precision) {
            (ScalarKind::Real, Precision::Single) => ScalarKind::Float,
            (ScalarKind::Real, Precision::Double) => ScalarKind::Double,
            (other, _) => other,
        }
    }

    /// Short tag used in structural signatures.
    pub const fn tag(self) -> &'static str {
        match self {
            ScalarKind::Bool => "b",
            ScalarKind::Int => "i",
            ScalarKind::UInt => "u",
            ScalarKind::Long => "l",
            ScalarKind::Float => "f",
            ScalarKind::Double => "d",
            ScalarKind::Real => "r",
        }
    }
}

/// Target floating precision of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

/// A single host-side value.
///
/// Integers of every width are carried as `i64` and floats as `f64`; the
/// owning kind decides how results are wrapped or rounded (see
/// [`ScalarValue::cast`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ScalarValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ScalarValue::Bool(b) => f64::from(u8::from(b)),
            ScalarValue::Int(v) => v as f64,
            ScalarValue::Float(v) => v,
        }
    }

    /// Integer view; floats truncate toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            ScalarValue::Bool(b) => i64::from(b),
            ScalarValue::Int(v) => v,
            ScalarValue::Float(v) => v as i64,
        }
    }

    /// Non-zero is true.
    pub fn as_bool(self) -> bool {
        match self {
            ScalarValue::Bool(b) => b,
            ScalarValue::Int(v) => v != 0,
            ScalarValue::Float(v) => v != 0.0,
        }
    }

    /// Convert to the representation of a concrete `kind`.
    ///
    /// `Int` and `UInt` wrap to 32 bits, `Float` rounds to `f32`. `Real`
    /// must be resolved by the caller; it is treated as `Double` here.
    pub fn cast(self, kind: ScalarKind) -> ScalarValue {
        match kind {
            ScalarKind::Bool => ScalarValue::Bool(self.as_bool()),
            ScalarKind::Int => ScalarValue::Int(i64::from(self.as_i64() as i32)),
            ScalarKind::UInt => ScalarValue::Int(i64::from(self.as_i64() as u32)),
            ScalarKind::Long => ScalarValue::Int(self.as_i64()),
            ScalarKind::Float => ScalarValue::Float(f64::from(self.as_f64() as f32)),
            ScalarKind::Double | ScalarKind::Real => ScalarValue::Float(self.as_f64()),
        }
    }

    /// The zero value of `kind`.
    pub fn zero(kind: ScalarKind) -> ScalarValue {
        match kind {
            ScalarKind::Bool => ScalarValue::Bool(false),
            k if k.is_integer() => ScalarValue::Int(0),
            _ => ScalarValue::Float(0.0),
        }
    }
}

/// Rust element types that map onto a storable [`ScalarKind`].
pub trait Element: bytemuck::Pod + Send + Sync + 'static {
    const KIND: ScalarKind;

    /// Move a vector into type-erased host storage.
    fn wrap(data: Vec<Self>) -> HostData;

    /// Typed view, `None` if the storage holds another kind.
    fn slice(data: &HostData) -> Option<&[Self]>;

    /// Mutable typed view, `None` if the storage holds another kind.
    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]>;
}

macro_rules! impl_element {
    ($ty:ty, $kind:ident) => {
        impl Element for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;

            fn wrap(data: Vec<Self>) -> HostData {
                HostData::$kind(data)
            }

            fn slice(data: &HostData) -> Option<&[Self]> {
                match data {
                    HostData::$kind(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
                match data {
                    HostData::$kind(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(i32, Int);
impl_element!(u32, UInt);
impl_element!(i64, Long);
impl_element!(f32, Float);
impl_element!(f64, Double);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_resolves_by_precision() {
        assert_eq!(ScalarKind::Real.resolve(Precision::Single), ScalarKind::Float);
        assert_eq!(ScalarKind::Real.resolve(Precision::Double), ScalarKind::Double);
        assert_eq!(ScalarKind::Int.resolve(Precision::Double), ScalarKind::Int);
        assert_eq!(ScalarKind::Real.size_bytes(Precision::Single), 4);
        assert_eq!(ScalarKind::Real.size_bytes(Precision::Double), 8);
    }

    #[test]
    fn cast_wraps_and_rounds() {
        assert_eq!(ScalarValue::Int(-1).cast(ScalarKind::UInt), ScalarValue::Int(4294967295));
        assert_eq!(
            ScalarValue::Int(i64::from(i32::MAX) + 1).cast(ScalarKind::Int),
            ScalarValue::Int(i64::from(i32::MIN))
        );
        assert_eq!(ScalarValue::Float(2.9).cast(ScalarKind::Int), ScalarValue::Int(2));
        assert_eq!(
            ScalarValue::Float(0.1).cast(ScalarKind::Float),
            ScalarValue::Float(f64::from(0.1f32))
        );
        assert_eq!(ScalarValue::Float(0.5).cast(ScalarKind::Bool), ScalarValue::Bool(true));
    }

    #[test]
    fn storable_kinds() {
        let storable: Vec<_> = ScalarKind::ALL.into_iter().filter(|k| k.is_storable()).collect();
        assert_eq!(
            storable,
            vec![
                ScalarKind::Int,
                ScalarKind::UInt,
                ScalarKind::Long,
                ScalarKind::Float,
                ScalarKind::Double
            ]
        );
    }
}
