//! Usage errors.
//!
//! Raised when a caller breaks a documented contract: resizing storage the
//! engine does not own, reading a buffer as the wrong element type, or
//! executing a method that was never initialized. None of these are
//! recoverable by retrying the same call.

use thiserror::Error;

use crate::ids::BufferId;
use crate::scalar::ScalarKind;

/// Contract violations detected at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// Borrowed buffers are never reallocated by the engine.
    #[error("cannot resize borrowed buffer {buffer}: storage is owned externally")]
    ResizeBorrowed { buffer: BufferId },

    /// Typed access with an element type that does not match the buffer.
    #[error("buffer {buffer} holds {actual:?} elements, {requested:?} requested")]
    KindMismatch {
        buffer: BufferId,
        requested: ScalarKind,
        actual: ScalarKind,
    },

    /// Bulk write whose length differs from the buffer length.
    #[error("buffer {buffer} has {len} elements, {provided} provided")]
    LengthMismatch {
        buffer: BufferId,
        len: usize,
        provided: usize,
    },

    /// Buffers hold concrete numeric kinds only.
    #[error("{kind:?} is not a storable buffer kind")]
    UnsupportedBufferKind { kind: ScalarKind },

    /// `execute` called on a method still in the uninitialized state.
    #[error("method `{method}` executed before init")]
    NotInitialized { method: String },
}
