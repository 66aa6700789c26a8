//! Device abstraction.
//!
//! A [`ComputeDevice`] turns a [`KernelPlan`] into a backend [`Program`]
//! and runs compiled kernels over an index space. Dispatches issued with
//! [`ComputeDevice::enqueue`] are only guaranteed visible in host memory
//! after [`ComputeDevice::synchronize`].

use std::fmt;

use tessera_foundation::{BufferRef, MemoryBuffer, ScalarKind};
use tessera_ir::Parameter;

pub use tessera_ir::DeviceCapabilities;

use crate::cache::CompiledKernel;
use crate::compiler::KernelPlan;
use crate::error::Result;
use crate::host::HostProgram;

/// How a kernel uses a bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    /// Output destinations.
    ReadWrite,
}

/// One fixed kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgSlot {
    Buffer { kind: ScalarKind, access: Access },
    Parameter { kind: ScalarKind },
}

impl ArgSlot {
    pub fn kind(&self) -> ScalarKind {
        match *self {
            ArgSlot::Buffer { kind, .. } | ArgSlot::Parameter { kind } => kind,
        }
    }
}

impl fmt::Display for ArgSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSlot::Buffer { kind, .. } => write!(f, "buffer of {kind:?}"),
            ArgSlot::Parameter { kind } => write!(f, "parameter of {kind:?}"),
        }
    }
}

/// A value bound to an [`ArgSlot`].
#[derive(Debug, Clone)]
pub enum ArgBinding {
    Buffer(BufferRef),
    Parameter(Parameter),
}

impl ArgBinding {
    pub fn matches(&self, slot: &ArgSlot) -> bool {
        match (self, slot) {
            (ArgBinding::Buffer(buffer), ArgSlot::Buffer { kind, .. }) => buffer.kind() == *kind,
            (ArgBinding::Parameter(parameter), ArgSlot::Parameter { kind }) => parameter.kind() == *kind,
            _ => false,
        }
    }

    pub fn as_buffer(&self) -> Option<&MemoryBuffer> {
        match self {
            ArgBinding::Buffer(buffer) => Some(buffer),
            ArgBinding::Parameter(_) => None,
        }
    }
}

impl fmt::Display for ArgBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgBinding::Buffer(buffer) => write!(f, "buffer of {:?}", buffer.kind()),
            ArgBinding::Parameter(parameter) => write!(f, "parameter of {:?}", parameter.kind()),
        }
    }
}

/// Index space of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSize {
    /// Elements written per destination.
    pub elements: usize,
    /// Work items (`elements / vector_width`).
    pub items: usize,
}

/// Backend-specific compiled form of a kernel.
pub enum Program {
    Host(HostProgram),
    #[cfg(feature = "gpu")]
    Wgpu(crate::pipeline::WgpuProgram),
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Host(program) => f.debug_tuple("Host").field(&program.len()).finish(),
            #[cfg(feature = "gpu")]
            Program::Wgpu(_) => f.write_str("Wgpu"),
        }
    }
}

pub trait ComputeDevice {
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Compile a plan. Failures are [`Error::Compilation`](crate::Error::Compilation).
    fn compile(&self, plan: &KernelPlan) -> Result<Program>;

    /// Queue a dispatch. Arguments have already been checked against the
    /// kernel's slots.
    fn enqueue(&self, kernel: &CompiledKernel, args: &[ArgBinding], work: WorkSize) -> Result<()>;

    /// Block until every queued dispatch has completed and its writes are
    /// visible in host memory.
    fn synchronize(&self) -> Result<()>;

    /// Run one dispatch to completion.
    fn dispatch(&self, kernel: &CompiledKernel, args: &[ArgBinding], work: WorkSize) -> Result<()> {
        self.enqueue(kernel, args, work)?;
        self.synchronize()
    }

    /// Make the host copy of `buffer` current.
    fn read_back(&self, _buffer: &MemoryBuffer) -> Result<()> {
        self.synchronize()
    }
}
