//! Multi-component expressions.
//!
//! A [`VectorExpr`] is an ordered tuple of node handles. Component order is
//! physical meaning (x, y, z), so every operation preserves it. Reordering
//! and slicing share handles with the source; nothing is deep-copied.

use std::ops::{Add, Div, Mul, Neg, Range, Sub};

use tessera_foundation::BufferRef;

use crate::error::TypeError;
use crate::node::{BinaryOp, Expr, UnaryOp};
use crate::ops;

#[derive(Clone, Debug, Default)]
pub struct VectorExpr {
    components: Vec<Expr>,
}

impl VectorExpr {
    pub fn new(components: Vec<Expr>) -> Self {
        Self { components }
    }

    /// One buffer element per component, all at the current index.
    pub fn from_buffers(buffers: &[BufferRef]) -> Self {
        Self::from_buffers_at(buffers, 0)
    }

    pub fn from_buffers_at(buffers: &[BufferRef], offset: i64) -> Self {
        Self::new(buffers.iter().map(|b| ops::buffer_at(b, offset)).collect())
    }

    /// `len` components all referencing the same node.
    pub fn broadcast(scalar: &Expr, len: usize) -> Self {
        Self::new(vec![scalar.clone(); len])
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Expr> {
        self.components.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.components.iter()
    }

    pub fn components(&self) -> &[Expr] {
        &self.components
    }

    pub fn into_components(self) -> Vec<Expr> {
        self.components
    }

    /// Components picked by index, in the order given. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> Result<Self, TypeError> {
        indices
            .iter()
            .map(|&i| {
                self.components.get(i).cloned().ok_or_else(|| {
                    TypeError::new("select", &[], format!("component {i} out of range for length {}", self.len()))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn slice(&self, range: Range<usize>) -> Result<Self, TypeError> {
        self.components
            .get(range.clone())
            .map(|c| Self::new(c.to_vec()))
            .ok_or_else(|| {
                TypeError::new(
                    "slice",
                    &[],
                    format!("range {range:?} out of bounds for length {}", self.len()),
                )
            })
    }

    pub fn map<F>(&self, f: F) -> Result<Self, TypeError>
    where
        F: FnMut(&Expr) -> Result<Expr, TypeError>,
    {
        self.components.iter().map(f).collect::<Result<Vec<_>, _>>().map(Self::new)
    }

    /// Combine component `i` of `self` with component `i` of `other`.
    pub fn zip_with<F>(&self, other: &VectorExpr, op: &'static str, mut f: F) -> Result<Self, TypeError>
    where
        F: FnMut(&Expr, &Expr) -> Result<Expr, TypeError>,
    {
        if self.len() != other.len() {
            return Err(TypeError::arity(op, self.len(), other.len()));
        }
        self.components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| f(a, b))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn component_wise(&self, op: BinaryOp, other: &VectorExpr) -> Result<Self, TypeError> {
        self.zip_with(other, op.name(), |a, b| ops::binary(op, a, b))
    }

    pub fn apply(&self, op: UnaryOp) -> Result<Self, TypeError> {
        self.map(|c| ops::unary(op, c))
    }

    /// Every component multiplied by `factor`.
    pub fn scale(&self, factor: &Expr) -> Result<Self, TypeError> {
        self.map(|c| ops::mul(c, factor))
    }

    pub fn try_add(&self, other: &VectorExpr) -> Result<Self, TypeError> {
        self.component_wise(BinaryOp::Add, other)
    }

    pub fn try_sub(&self, other: &VectorExpr) -> Result<Self, TypeError> {
        self.component_wise(BinaryOp::Sub, other)
    }

    pub fn try_mul(&self, other: &VectorExpr) -> Result<Self, TypeError> {
        self.component_wise(BinaryOp::Mul, other)
    }

    pub fn try_div(&self, other: &VectorExpr) -> Result<Self, TypeError> {
        self.component_wise(BinaryOp::Div, other)
    }

    pub fn try_neg(&self) -> Result<Self, TypeError> {
        self.apply(UnaryOp::Neg)
    }

    /// Left fold with `+`. Empty vectors have no sum.
    pub fn sum(&self) -> Result<Expr, TypeError> {
        let (first, rest) = self
            .components
            .split_first()
            .ok_or_else(|| TypeError::arity("sum", 1, 0))?;
        rest.iter().try_fold(first.clone(), |acc, c| ops::add(&acc, c))
    }

    pub fn dot(&self, other: &VectorExpr) -> Result<Expr, TypeError> {
        self.try_mul(other)?.sum()
    }
}

impl FromIterator<Expr> for VectorExpr {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a VectorExpr {
    type Item = &'a Expr;
    type IntoIter = std::slice::Iter<'a, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.iter()
    }
}

macro_rules! vector_operator {
    ($trait:ident, $method:ident, $try:ident) => {
        impl $trait<&VectorExpr> for &VectorExpr {
            type Output = Result<VectorExpr, TypeError>;

            fn $method(self, rhs: &VectorExpr) -> Self::Output {
                self.$try(rhs)
            }
        }
    };
}

vector_operator!(Add, add, try_add);
vector_operator!(Sub, sub, try_sub);
vector_operator!(Mul, mul, try_mul);
vector_operator!(Div, div, try_div);

impl Mul<&Expr> for &VectorExpr {
    type Output = Result<VectorExpr, TypeError>;

    fn mul(self, rhs: &Expr) -> Self::Output {
        self.scale(rhs)
    }
}

impl Neg for &VectorExpr {
    type Output = Result<VectorExpr, TypeError>;

    fn neg(self) -> Self::Output {
        self.try_neg()
    }
}
