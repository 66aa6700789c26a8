//! Tessera IR - typed expression graphs
//!
//! Per-grid-point arithmetic is described as a DAG of immutable, typed
//! [`Expr`] nodes. Nodes never touch a device: constructing one only records
//! structure and a result kind checked against the promotion table in
//! [`types`]. The graph is rendered to kernel source by [`render`] under a
//! [`KernelConfig`].
//!
//! Pipeline: node builders ([`ops`]) -> [`VectorExpr`] -> [`Renderer`] -> kernel compiler

pub mod config;
pub mod error;
pub mod node;
pub mod ops;
pub mod render;
pub mod types;
pub mod vector;

pub use config::{ConfigError, DeviceCapabilities, Dialect, KernelConfig, VECTOR_WIDTHS};
pub use error::TypeError;
pub use node::{BinaryOp, Builtin, Expr, NodeId, NodeKind, Parameter, UnaryOp};
pub use render::{BASE_VAR, INDEX_VAR, Rendered, Renderer, Symbols, ZERO_LITERALS, is_zero_literal};
pub use vector::VectorExpr;

pub use tessera_foundation::{BufferRef, Precision, ScalarKind, ScalarValue};
