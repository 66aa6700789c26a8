//! Tessera Runtime.
//!
//! Solvers and boundary conditions implement the two-phase
//! [`NumericalMethod`] contract on top of the kernel engine in
//! [`tessera_gpu`]: `init` builds expressions and compiles kernels once,
//! `execute` dispatches them every timestep. Methods compose into a
//! [`MethodList`] whose order is the order of the timestep.
//!
//! - [`method`] - lifecycle trait and state
//! - [`methods`] - [`FusedAssignment`] and [`MaskedBoundary`]
//! - [`list`] - ordered `init_all` / `execute_all`
//! - [`config`] - JSON engine configuration and context construction
//! - [`logging`] - subscriber setup for applications
//!
//! # Example
//!
//! ```ignore
//! use tessera_runtime::{EngineConfig, FusedAssignment, MethodList};
//!
//! let mut ctx = EngineConfig::load("engine.json")?.build_context()?;
//! let mut step = MethodList::new();
//! step.push(FusedAssignment::from_vector("advect", &velocity, &update)?);
//! step.init_all(&mut ctx)?;
//! for _ in 0..steps {
//!     step.execute_all(&ctx)?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod list;
pub mod logging;
pub mod method;
pub mod methods;

pub use config::{BACKEND_ENV, BackendKind, CacheConfig, EngineConfig, HostConfig};
pub use error::{ConfigError, MethodError, Phase, Result};
pub use list::MethodList;
pub use logging::init_logging;
pub use method::{MethodState, NumericalMethod, not_initialized};
pub use methods::{FusedAssignment, MaskedBoundary};
