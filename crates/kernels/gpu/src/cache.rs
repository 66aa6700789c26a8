//! Kernel cache.
//!
//! Compiled kernels are keyed by structural [`Signature`], so independently
//! built but identical graphs share one compilation. The cache optionally
//! holds a bounded number of kernels and evicts the oldest insertion first.
//! Cached kernels own no buffers or expression nodes: everything they need
//! to run is captured in their slot layout and backend [`Program`].

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, info};

use tessera_ir::KernelConfig;

use crate::compiler::KernelPlan;
use crate::device::{ArgSlot, ComputeDevice, Program};
use crate::error::{Error, Result};
use crate::signature::Signature;

/// A kernel the device has accepted.
#[derive(Debug)]
pub struct CompiledKernel {
    pub name: String,
    pub signature: Signature,
    pub config: KernelConfig,
    pub slots: Vec<ArgSlot>,
    /// Destination slot of each output.
    pub outputs: Vec<usize>,
    pub source: String,
    pub program: Program,
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Device compilations attempted, including failed ones.
    pub compilations: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
pub struct KernelCache {
    entries: IndexMap<Signature, Arc<CompiledKernel>>,
    capacity: Option<usize>,
    stats: CacheStats,
}

impl KernelCache {
    /// `None` for an unbounded cache.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Return the cached kernel for `plan`, compiling it on a miss.
    ///
    /// A failed compilation is not cached, so the same plan fails again
    /// on retry.
    pub fn get_or_compile(&mut self, plan: &KernelPlan, device: &dyn ComputeDevice) -> Result<Arc<CompiledKernel>> {
        if let Some(kernel) = self.entries.get(&plan.signature) {
            self.stats.hits += 1;
            debug!(kernel = %kernel.name, "kernel cache hit");
            return Ok(Arc::clone(kernel));
        }
        self.stats.misses += 1;

        let limit = device.capabilities().max_kernel_args;
        if plan.slots.len() > limit {
            return Err(Error::compilation(
                &plan.name,
                format!(
                    "kernel takes {} arguments, device accepts at most {limit}",
                    plan.slots.len()
                ),
            ));
        }

        info!(
            kernel = %plan.name,
            device = %device.capabilities().name,
            dialect = %plan.config.dialect,
            "compiling kernel"
        );
        self.stats.compilations += 1;
        let program = device.compile(plan).inspect_err(|err| {
            error!(kernel = %plan.name, error = %err, "kernel compilation failed");
        })?;

        let kernel = Arc::new(CompiledKernel {
            name: plan.name.clone(),
            signature: plan.signature.clone(),
            config: plan.config.clone(),
            slots: plan.slots.clone(),
            outputs: plan.output_slots(),
            source: plan.source.clone(),
            program,
        });
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity.max(1) {
                self.evict_oldest();
            }
        }
        self.entries.insert(plan.signature.clone(), Arc::clone(&kernel));
        Ok(kernel)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, kernel)) = self.entries.shift_remove_index(0) {
            self.stats.evictions += 1;
            debug!(kernel = %kernel.name, "kernel evicted");
        }
    }

    pub fn get(&self, signature: &Signature) -> Option<Arc<CompiledKernel>> {
        self.entries.get(signature).cloned()
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.entries.contains_key(signature)
    }

    /// Drop one kernel. Handles to it fail on their next dispatch.
    pub fn evict(&mut self, signature: &Signature) -> bool {
        let removed = self.entries.shift_remove(signature);
        if let Some(kernel) = &removed {
            self.stats.evictions += 1;
            debug!(kernel = %kernel.name, "kernel evicted");
        }
        removed.is_some()
    }

    pub fn clear(&mut self) {
        self.stats.evictions += self.entries.len() as u64;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use tessera_foundation::MemoryBuffer;
    use tessera_ir::ops;

    use super::*;
    use crate::compiler::Output;
    use crate::host::{HostDevice, HostOptions};

    fn plan(literal: f32) -> KernelPlan {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 4]);
        let value = ops::add(&ops::buffer(&u), &ops::float(literal)).unwrap();
        KernelPlan::build(&[Output::new(&u, value)], &KernelConfig::default()).unwrap()
    }

    #[test]
    fn identical_plans_hit() {
        let device = HostDevice::new();
        let mut cache = KernelCache::new(None);
        let a = cache.get_or_compile(&plan(1.0), &device).unwrap();
        let b = cache.get_or_compile(&plan(1.0), &device).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                compilations: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn bounded_cache_evicts_oldest_first() {
        let device = HostDevice::new();
        let mut cache = KernelCache::new(Some(2));
        let (p1, p2, p3) = (plan(1.0), plan(2.0), plan(3.0));
        for p in [&p1, &p2, &p3] {
            cache.get_or_compile(p, &device).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&p1.signature));
        assert!(cache.contains(&p2.signature));
        assert!(cache.contains(&p3.signature));
        assert_eq!(cache.stats().evictions, 1);

        cache.get_or_compile(&p1, &device).unwrap();
        assert_eq!(cache.stats().compilations, 4);
    }

    #[test]
    fn failed_compilations_are_not_cached() {
        let device = HostDevice::with_options(HostOptions {
            max_kernel_args: 0,
            ..HostOptions::default()
        });
        let mut cache = KernelCache::new(None);
        let err = cache.get_or_compile(&plan(1.0), &device).unwrap_err();
        assert!(matches!(err, Error::Compilation { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn explicit_eviction() {
        let device = HostDevice::new();
        let mut cache = KernelCache::new(None);
        let p = plan(1.0);
        cache.get_or_compile(&p, &device).unwrap();
        assert!(cache.evict(&p.signature));
        assert!(!cache.evict(&p.signature));
        assert!(cache.get(&p.signature).is_none());
    }
}
