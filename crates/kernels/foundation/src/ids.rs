//! Process-unique identifiers.
//!
//! Buffers and run-time parameters are referenced from expression graphs by
//! identity. The ids are handed out from monotonically increasing counters
//! and never reused within a process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER: AtomicU64 = AtomicU64::new(0);
static NEXT_PARAM: AtomicU64 = AtomicU64::new(0);

/// Identity of a [`MemoryBuffer`](crate::MemoryBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub(crate) fn next() -> Self {
        Self(NEXT_BUFFER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Identity of a run-time kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    /// Allocate a fresh parameter id.
    pub fn next() -> Self {
        Self(NEXT_PARAM.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param#{}", self.0)
    }
}
