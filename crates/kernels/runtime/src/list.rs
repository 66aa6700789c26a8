//! Ordered method composition.
//!
//! A [`MethodList`] runs its methods strictly in insertion order, which
//! encodes the physical order of a timestep (bulk update before boundary
//! reapplication, for instance). The first failure stops the pass.

use tracing::{debug, error, instrument};

use tessera_gpu::ExecutionContext;

use crate::error::{MethodError, Phase, Result};
use crate::method::{MethodState, NumericalMethod};

#[derive(Default)]
pub struct MethodList {
    methods: Vec<Box<dyn NumericalMethod>>,
}

impl MethodList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, method: impl NumericalMethod + 'static) -> &mut Self {
        self.methods.push(Box::new(method));
        self
    }

    pub fn push_boxed(&mut self, method: Box<dyn NumericalMethod>) -> &mut Self {
        self.methods.push(method);
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name()).collect()
    }

    pub fn states(&self) -> Vec<MethodState> {
        self.methods.iter().map(|m| m.state()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn NumericalMethod> {
        self.methods.iter().map(|m| m.as_ref())
    }

    #[instrument(skip_all, fields(methods = self.methods.len()))]
    pub fn init_all(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        for method in &mut self.methods {
            debug!(method = %method.name(), "init");
            method.init(ctx).map_err(|source| fail(method.as_ref(), Phase::Init, source))?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(methods = self.methods.len()))]
    pub fn execute_all(&mut self, ctx: &ExecutionContext) -> Result<()> {
        for method in &mut self.methods {
            debug!(method = %method.name(), "execute");
            method
                .execute(ctx)
                .map_err(|source| fail(method.as_ref(), Phase::Execute, source))?;
        }
        Ok(())
    }
}

fn fail(method: &dyn NumericalMethod, phase: Phase, source: tessera_gpu::Error) -> MethodError {
    error!(method = %method.name(), %phase, error = %source, "method failed");
    MethodError::new(method.name(), phase, source)
}
