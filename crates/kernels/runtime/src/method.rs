//! The numerical method lifecycle.
//!
//! ```text
//! Uninitialized --init()--> Ready --execute()--> Ready
//! ```
//!
//! `init` builds a method's expressions and compiles its kernels, `execute`
//! dispatches them against the current buffer contents. There is no way
//! back to `Uninitialized`.

use tessera_foundation::UsageError;
use tessera_gpu::ExecutionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MethodState {
    #[default]
    Uninitialized,
    Ready,
}

/// A solver step, boundary condition or any other per-timestep operation
/// expressed as compiled kernels.
pub trait NumericalMethod {
    fn name(&self) -> &str;

    fn state(&self) -> MethodState;

    /// Build and compile. Calling it again recompiles, which is a cache hit
    /// for an unchanged method.
    fn init(&mut self, ctx: &mut ExecutionContext) -> tessera_gpu::Result<()>;

    /// Dispatch the compiled kernels.
    ///
    /// # Errors
    ///
    /// [`UsageError::NotInitialized`] before [`init`](Self::init).
    fn execute(&mut self, ctx: &ExecutionContext) -> tessera_gpu::Result<()>;
}

/// The error every method returns from `execute` before `init`.
pub fn not_initialized(method: &str) -> tessera_gpu::Error {
    UsageError::NotInitialized {
        method: method.to_string(),
    }
    .into()
}
