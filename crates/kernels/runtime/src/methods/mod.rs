//! Concrete method kinds.

mod assign;
mod boundary;

pub use assign::FusedAssignment;
pub use boundary::MaskedBoundary;
