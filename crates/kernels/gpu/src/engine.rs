//! Device execution context.
//!
//! An [`ExecutionContext`] owns one [`ComputeDevice`], the [`KernelCache`]
//! for that device and the default [`KernelConfig`] new kernels are built
//! with. Compiling returns a [`KernelHandle`]: the cached kernel plus the
//! argument values it will be dispatched with. Handles refer to the cache
//! weakly, so a kernel evicted from the cache can no longer be dispatched.

use std::sync::{Arc, Weak};

use tracing::trace;

use tessera_foundation::{BufferRef, Element};
use tessera_ir::KernelConfig;

use crate::cache::{CompiledKernel, KernelCache};
use crate::compiler::{KernelPlan, Output};
use crate::device::{ArgBinding, ComputeDevice, DeviceCapabilities, WorkSize};
use crate::error::{Error, Result};
use crate::host::HostDevice;
use crate::signature::Signature;

/// A compiled kernel together with its bound arguments.
#[derive(Debug, Clone)]
pub struct KernelHandle {
    name: String,
    signature: Signature,
    kernel: Weak<CompiledKernel>,
    bindings: Vec<ArgBinding>,
}

impl KernelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Arguments in slot order.
    pub fn bindings(&self) -> &[ArgBinding] {
        &self.bindings
    }

    /// Whether the kernel is still cached.
    pub fn is_live(&self) -> bool {
        self.kernel.strong_count() > 0
    }

    /// Replace every argument. On mismatch the handle keeps its previous
    /// bindings.
    pub fn rebind(&mut self, bindings: Vec<ArgBinding>) -> Result<()> {
        let kernel = self.upgrade()?;
        check_bindings(&kernel, &bindings)?;
        self.bindings = bindings;
        Ok(())
    }

    /// Replace the buffer bound at `slot`.
    pub fn bind_buffer(&mut self, slot: usize, buffer: &BufferRef) -> Result<()> {
        let mut bindings = self.bindings.clone();
        let Some(binding) = bindings.get_mut(slot) else {
            return Err(Error::binding(
                &self.name,
                format!("slot {slot} out of range ({} slots)", self.bindings.len()),
            ));
        };
        *binding = ArgBinding::Buffer(buffer.clone());
        self.rebind(bindings)
    }

    fn upgrade(&self) -> Result<Arc<CompiledKernel>> {
        self.kernel
            .upgrade()
            .ok_or_else(|| Error::dispatch(&self.name, "kernel evicted from cache"))
    }
}

fn check_bindings(kernel: &CompiledKernel, bindings: &[ArgBinding]) -> Result<()> {
    if bindings.len() != kernel.slots.len() {
        return Err(Error::binding(
            &kernel.name,
            format!("expected {} arguments, got {}", kernel.slots.len(), bindings.len()),
        ));
    }
    for (slot, (binding, expected)) in bindings.iter().zip(&kernel.slots).enumerate() {
        if !binding.matches(expected) {
            return Err(Error::binding(
                &kernel.name,
                format!("slot {slot} expects {expected}, got {binding}"),
            ));
        }
    }
    Ok(())
}

/// Work size of a dispatch: destinations must agree in length and the
/// length must split evenly into vector-width work items.
fn work_size(kernel: &CompiledKernel, bindings: &[ArgBinding]) -> Result<WorkSize> {
    let mut elements = None;
    for &slot in &kernel.outputs {
        let Some(buffer) = bindings[slot].as_buffer() else {
            return Err(Error::binding(&kernel.name, format!("destination slot {slot} is not a buffer")));
        };
        let len = buffer.len();
        match elements {
            None => elements = Some(len),
            Some(n) if n != len => {
                return Err(Error::binding(
                    &kernel.name,
                    format!("destination lengths differ ({n} and {len})"),
                ));
            }
            Some(_) => {}
        }
    }
    let elements = elements.unwrap_or(0);
    let width = kernel.config.vector_width as usize;
    if elements % width != 0 {
        return Err(Error::binding(
            &kernel.name,
            format!("destination length {elements} is not a multiple of vector width {width}"),
        ));
    }
    Ok(WorkSize {
        elements,
        items: elements / width,
    })
}

pub struct ExecutionContext {
    device: Box<dyn ComputeDevice>,
    cache: KernelCache,
    config: KernelConfig,
}

impl ExecutionContext {
    /// Context on a default [`HostDevice`].
    pub fn host() -> Self {
        Self::new(Box::new(HostDevice::new()))
    }

    /// Context with a config derived from the device's capabilities.
    pub fn new(device: Box<dyn ComputeDevice>) -> Self {
        let config = KernelConfig::for_device(device.capabilities());
        Self {
            device,
            cache: KernelCache::new(None),
            config,
        }
    }

    /// Context with an explicit default config, validated against the device.
    pub fn with_config(device: Box<dyn ComputeDevice>, config: KernelConfig) -> Result<Self> {
        config.validate_for(device.capabilities())?;
        Ok(Self {
            device,
            cache: KernelCache::new(None),
            config,
        })
    }

    /// Context on the first suitable GPU adapter.
    #[cfg(feature = "gpu")]
    pub fn gpu() -> Result<Self> {
        let device = crate::pipeline::WgpuDevice::new()?;
        Ok(Self::new(Box::new(device)))
    }

    /// Bound the kernel cache. Replaces any cached kernels.
    pub fn with_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.cache = KernelCache::new(capacity);
        self
    }

    /// Build and compile a kernel with the context's default config.
    pub fn compile(&mut self, outputs: &[Output]) -> Result<KernelHandle> {
        let config = self.config.clone();
        self.compile_with(outputs, &config)
    }

    /// Build and compile a kernel with a specific config.
    pub fn compile_with(&mut self, outputs: &[Output], config: &KernelConfig) -> Result<KernelHandle> {
        config.validate_for(self.device.capabilities())?;
        let plan = KernelPlan::build(outputs, config)?;
        let kernel = self.cache.get_or_compile(&plan, self.device.as_ref())?;
        Ok(KernelHandle {
            name: kernel.name.clone(),
            signature: kernel.signature.clone(),
            kernel: Arc::downgrade(&kernel),
            bindings: plan.bindings,
        })
    }

    /// Queue a dispatch without waiting for it.
    pub fn enqueue(&self, handle: &KernelHandle) -> Result<()> {
        let kernel = handle.upgrade()?;
        check_bindings(&kernel, &handle.bindings)?;
        let work = work_size(&kernel, &handle.bindings)?;
        if work.elements == 0 {
            trace!(kernel = %kernel.name, "empty dispatch skipped");
            return Ok(());
        }
        self.device.enqueue(&kernel, &handle.bindings, work)
    }

    /// Dispatch and wait for completion.
    pub fn dispatch(&self, handle: &KernelHandle) -> Result<()> {
        self.enqueue(handle)?;
        self.device.synchronize()
    }

    /// Wait for all queued dispatches.
    pub fn synchronize(&self) -> Result<()> {
        self.device.synchronize()
    }

    /// Copy a buffer's current contents to the host.
    pub fn read_back<T: Element>(&self, buffer: &BufferRef) -> Result<Vec<T>> {
        self.device.read_back(buffer)?;
        Ok(buffer.to_vec()?)
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut KernelCache {
        &mut self.cache
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        self.device.capabilities()
    }

    pub fn device(&self) -> &dyn ComputeDevice {
        self.device.as_ref()
    }
}
