//! Tessera Foundation
//!
//! Leaf primitives shared by every layer of the kernel engine:
//!
//! - [`scalar`] - scalar kinds, precision and the host element trait
//! - [`memory`] - owned or borrowed typed memory buffers
//! - [`stable_hash`] - deterministic FNV-1a hashing for kernel signatures
//! - [`ids`] - process-unique identifiers for buffers and parameters
//! - [`error`] - usage errors raised by misuse of the public contracts

pub mod error;
pub mod ids;
pub mod memory;
pub mod scalar;
pub mod stable_hash;

pub use error::UsageError;
pub use ids::{BufferId, ParamId};
pub use memory::{BufferRef, BufferWriteGuard, HostData, MemoryBuffer, SharedHostData};
pub use scalar::{Element, Precision, ScalarKind, ScalarValue};
pub use stable_hash::{FNV1A_OFFSET_BASIS_64, FNV1A_PRIME_64, StableHasher, fnv1a64, fnv1a64_mix};
