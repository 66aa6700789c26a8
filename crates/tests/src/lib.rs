//! Integration test harness for tessera.
//!
//! Wraps an [`ExecutionContext`] and a [`MethodList`] so end-to-end tests
//! read as a timestep loop: build fields, push methods, init, step, verify.

use tessera_foundation::{BufferRef, Element, MemoryBuffer};
use tessera_gpu::{CacheStats, ExecutionContext};
use tessera_runtime::{EngineConfig, MethodError, MethodList, NumericalMethod};

/// Test harness running a method list on one execution context.
pub struct TestHarness {
    ctx: ExecutionContext,
    methods: MethodList,
    steps: u64,
}

impl TestHarness {
    /// Harness on the host backend with default settings.
    pub fn host() -> Self {
        Self::with_context(ExecutionContext::host())
    }

    /// Harness from a JSON engine config.
    ///
    /// # Panics
    ///
    /// Panics if the config does not parse or the device cannot be opened.
    pub fn from_json(json: &str) -> Self {
        let config = EngineConfig::from_json_str(json).expect("invalid engine config");
        Self::with_context(config.build_context().expect("failed to build context"))
    }

    pub fn with_context(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            methods: MethodList::new(),
            steps: 0,
        }
    }

    pub fn push(&mut self, method: impl NumericalMethod + 'static) -> &mut Self {
        self.methods.push(method);
        self
    }

    /// # Panics
    ///
    /// Panics if any method fails to initialize.
    pub fn init(&mut self) {
        self.try_init().expect("init_all failed");
    }

    pub fn try_init(&mut self) -> Result<(), MethodError> {
        self.methods.init_all(&mut self.ctx)
    }

    /// Execute every method once.
    ///
    /// # Panics
    ///
    /// Panics if any method fails.
    pub fn step(&mut self) {
        self.try_step().expect("execute_all failed");
    }

    pub fn try_step(&mut self) -> Result<(), MethodError> {
        self.methods.execute_all(&self.ctx)?;
        self.steps += 1;
        Ok(())
    }

    pub fn run_steps(&mut self, count: u64) {
        for _ in 0..count {
            self.step();
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    pub fn methods(&self) -> &MethodList {
        &self.methods
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.ctx.cache().stats()
    }

    /// Synchronize and copy a buffer out.
    ///
    /// # Panics
    ///
    /// Panics on a dispatch failure or an element kind mismatch.
    pub fn read<T: Element>(&self, buffer: &BufferRef) -> Vec<T> {
        self.ctx.read_back(buffer).expect("read back failed")
    }
}

/// Owned buffer initialised from `values`.
pub fn field<T: Element>(values: &[T]) -> BufferRef {
    MemoryBuffer::from_vec(values.to_vec())
}
