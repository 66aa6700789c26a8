use tessera_foundation::{BufferRef, ScalarValue};
use tessera_gpu::{ExecutionContext, Output};
use tessera_ir::{Parameter, TypeError, ops};

use crate::method::{MethodState, NumericalMethod};
use crate::methods::FusedAssignment;

/// Dirichlet-style boundary: every component of a field is overwritten
/// with a prescribed value wherever the mask buffer is nonzero and left
/// unchanged elsewhere.
///
/// Values are kernel parameters, so [`set_value`](Self::set_value) takes
/// effect on the next execute without recompiling.
#[derive(Debug)]
pub struct MaskedBoundary {
    values: Vec<Parameter>,
    inner: FusedAssignment,
}

impl MaskedBoundary {
    pub fn new(
        name: impl Into<String>,
        field: &[BufferRef],
        mask: &BufferRef,
        values: &[f64],
    ) -> Result<Self, TypeError> {
        if field.len() != values.len() {
            return Err(TypeError::arity("masked_boundary", field.len(), values.len()));
        }
        let zero = ops::literal(mask.kind(), ScalarValue::zero(mask.kind()));
        let inside = ops::ne(&ops::buffer(mask), &zero)?;
        let values: Vec<Parameter> = values.iter().map(|&v| Parameter::real(v)).collect();
        let outputs = field
            .iter()
            .zip(&values)
            .map(|(component, value)| {
                let source = ops::select(&inside, &ops::param(value), &ops::buffer(component))?;
                Ok(Output::new(component, source))
            })
            .collect::<Result<Vec<_>, TypeError>>()?;
        Ok(Self {
            values,
            inner: FusedAssignment::new(name, outputs),
        })
    }

    /// Change the prescribed value of one component.
    pub fn set_value(&self, component: usize, value: f64) -> bool {
        match self.values.get(component) {
            Some(parameter) => {
                parameter.set(ScalarValue::Float(value));
                true
            }
            None => false,
        }
    }

    pub fn value(&self, component: usize) -> Option<f64> {
        self.values.get(component).map(|p| p.value().as_f64())
    }

    pub fn components(&self) -> usize {
        self.values.len()
    }
}

impl NumericalMethod for MaskedBoundary {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn state(&self) -> MethodState {
        self.inner.state()
    }

    fn init(&mut self, ctx: &mut ExecutionContext) -> tessera_gpu::Result<()> {
        self.inner.init(ctx)
    }

    fn execute(&mut self, ctx: &ExecutionContext) -> tessera_gpu::Result<()> {
        self.inner.execute(ctx)
    }
}
