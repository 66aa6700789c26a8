use tracing::debug;

use tessera_foundation::BufferRef;
use tessera_gpu::{ExecutionContext, KernelHandle, Output, assign};
use tessera_ir::{KernelConfig, TypeError, VectorExpr};

use crate::method::{MethodState, NumericalMethod, not_initialized};

/// Evaluates a fixed set of output assignments as one fused kernel per
/// dispatch.
#[derive(Debug)]
pub struct FusedAssignment {
    name: String,
    outputs: Vec<Output>,
    config: Option<KernelConfig>,
    deferred: bool,
    kernel: Option<KernelHandle>,
}

impl FusedAssignment {
    pub fn new(name: impl Into<String>, outputs: Vec<Output>) -> Self {
        Self {
            name: name.into(),
            outputs,
            config: None,
            deferred: false,
            kernel: None,
        }
    }

    /// One output per component of `source`.
    pub fn from_vector(
        name: impl Into<String>,
        destinations: &[BufferRef],
        source: &VectorExpr,
    ) -> Result<Self, TypeError> {
        Ok(Self::new(name, assign(destinations, source)?))
    }

    /// Compile with `config` instead of the context default.
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enqueue on execute instead of waiting for completion.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn kernel(&self) -> Option<&KernelHandle> {
        self.kernel.as_ref()
    }

    pub fn kernel_mut(&mut self) -> Option<&mut KernelHandle> {
        self.kernel.as_mut()
    }
}

impl NumericalMethod for FusedAssignment {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MethodState {
        if self.kernel.is_some() {
            MethodState::Ready
        } else {
            MethodState::Uninitialized
        }
    }

    fn init(&mut self, ctx: &mut ExecutionContext) -> tessera_gpu::Result<()> {
        let kernel = match &self.config {
            Some(config) => ctx.compile_with(&self.outputs, config)?,
            None => ctx.compile(&self.outputs)?,
        };
        debug!(method = %self.name, kernel = %kernel.name(), "method initialized");
        self.kernel = Some(kernel);
        Ok(())
    }

    fn execute(&mut self, ctx: &ExecutionContext) -> tessera_gpu::Result<()> {
        let Some(kernel) = &self.kernel else {
            return Err(not_initialized(&self.name));
        };
        if self.deferred {
            ctx.enqueue(kernel)
        } else {
            ctx.dispatch(kernel)
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_foundation::{MemoryBuffer, UsageError};
    use tessera_gpu::Error;
    use tessera_ir::ops;

    use super::*;

    #[test]
    fn execute_before_init_is_a_usage_error() {
        let ctx = ExecutionContext::host();
        let u = MemoryBuffer::from_vec(vec![0.0f32; 2]);
        let mut method = FusedAssignment::new("fill", vec![Output::new(&u, ops::float(1.0))]);
        assert_eq!(method.state(), MethodState::Uninitialized);
        let err = method.execute(&ctx).unwrap_err();
        assert_eq!(
            err,
            Error::Usage(UsageError::NotInitialized {
                method: "fill".to_string()
            })
        );
    }

    #[test]
    fn vector_assignment_updates_every_component() {
        let mut ctx = ExecutionContext::host();
        let x = MemoryBuffer::from_vec(vec![1.0f32, 2.0]);
        let y = MemoryBuffer::from_vec(vec![3.0f32, 4.0]);
        let field = VectorExpr::from_buffers(&[x.clone(), y.clone()]);
        let doubled = field.scale(&ops::float(2.0)).unwrap();
        let mut method = FusedAssignment::from_vector("double", &[x.clone(), y.clone()], &doubled).unwrap();

        method.init(&mut ctx).unwrap();
        assert_eq!(method.state(), MethodState::Ready);
        method.execute(&ctx).unwrap();
        method.execute(&ctx).unwrap();
        assert_eq!(x.to_vec::<f32>().unwrap(), vec![4.0, 8.0]);
        assert_eq!(y.to_vec::<f32>().unwrap(), vec![12.0, 16.0]);
        assert_eq!(ctx.cache().stats().compilations, 1);
    }

    #[test]
    fn deferred_methods_complete_at_synchronize() {
        let mut ctx = ExecutionContext::host();
        let u = MemoryBuffer::from_vec(vec![0.0f32; 3]);
        let mut method = FusedAssignment::new("fill", vec![Output::new(&u, ops::float(7.0))]).deferred();
        method.init(&mut ctx).unwrap();
        method.execute(&ctx).unwrap();
        ctx.synchronize().unwrap();
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![7.0; 3]);
    }
}
