//! Kernel compilation and execution for tessera expression graphs.
//!
//! Output assignments over [`tessera_ir::Expr`] graphs are planned into one
//! fused kernel per call, keyed by a structural [`Signature`] and compiled
//! at most once per device:
//!
//! ```text
//! [Output] -> KernelPlan::build -> KernelCache::get_or_compile -> KernelHandle
//!                  |                         |
//!            source + slots         ComputeDevice::compile
//! ```
//!
//! Two devices are provided. [`HostDevice`] evaluates kernels on the CPU
//! with rayon and is always available. `WgpuDevice` runs WGSL kernels on a
//! GPU adapter and requires the `gpu` feature.
//!
//! # Deferred execution
//!
//! [`ExecutionContext::enqueue`] only queues work. Host-visible results are
//! guaranteed after [`ExecutionContext::synchronize`] or
//! [`ExecutionContext::read_back`]; [`ExecutionContext::dispatch`] does both.

mod cache;
mod compiler;
mod device;
mod emit;
mod engine;
mod error;
mod host;
mod signature;

#[cfg(feature = "gpu")]
mod context;
#[cfg(feature = "gpu")]
mod pipeline;

pub use cache::{CacheStats, CompiledKernel, KernelCache};
pub use compiler::{KernelPlan, Output, PlannedOutput, assign};
pub use device::{Access, ArgBinding, ArgSlot, ComputeDevice, DeviceCapabilities, Program, WorkSize};
pub use engine::{ExecutionContext, KernelHandle};
pub use error::{Error, ErrorKind, Result};
pub use host::{HostDevice, HostOptions, HostProgram};
pub use signature::Signature;

#[cfg(feature = "gpu")]
pub use context::{GpuContext, GpuContextOptions};
#[cfg(feature = "gpu")]
pub use pipeline::{WgpuDevice, WgpuProgram};
