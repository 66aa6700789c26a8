//! wgpu compute device.
//!
//! [`WgpuDevice`] compiles WGSL kernel plans into compute pipelines and
//! runs them. Each dispatch uploads its bound buffers, binds the parameter
//! block after the last slot and copies destination buffers into staging
//! buffers that are mapped back into host memory at synchronize.

use std::borrow::Cow;

use parking_lot::Mutex;
use tracing::{debug, trace};

use tessera_foundation::{BufferId, BufferRef, ScalarKind};
use tessera_ir::Dialect;

use crate::cache::CompiledKernel;
use crate::compiler::KernelPlan;
use crate::context::{GpuContext, padded_size};
use crate::device::{Access, ArgBinding, ArgSlot, ComputeDevice, DeviceCapabilities, Program, WorkSize};
use crate::emit::wgsl_params_binding;
use crate::error::{Error, Result};

/// A compiled compute pipeline.
pub struct WgpuProgram {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    workgroup_size: u32,
}

/// Destination copy waiting to be mapped into host memory.
struct Readback {
    kernel: String,
    buffer: BufferRef,
    staging: wgpu::Buffer,
    /// Padded staging size.
    bytes: u64,
    /// Host byte length at enqueue.
    len: usize,
}

pub struct WgpuDevice {
    context: GpuContext,
    pending: Mutex<Vec<Readback>>,
}

impl WgpuDevice {
    pub fn new() -> Result<Self> {
        Ok(Self::with_context(GpuContext::new()?))
    }

    pub fn with_context(context: GpuContext) -> Self {
        Self {
            context,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn layout_entries(slots: &[ArgSlot]) -> Vec<wgpu::BindGroupLayoutEntry> {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let mut entries: Vec<_> = slots
            .iter()
            .enumerate()
            .filter_map(|(slot, arg)| match arg {
                ArgSlot::Buffer { access, .. } => Some(storage(slot as u32, *access == Access::ReadOnly)),
                ArgSlot::Parameter { .. } => None,
            })
            .collect();
        entries.push(storage(wgsl_params_binding(slots.len()), true));
        entries
    }

    fn pending_writes_to(&self, ids: &[BufferId]) -> bool {
        self.pending.lock().iter().any(|r| ids.contains(&r.buffer.id()))
    }
}

/// Parameter block bytes in slot order followed by the item count. Every
/// WGSL field is four bytes wide, so the struct is tightly packed.
fn params_block(args: &[ArgBinding], items: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for arg in args {
        if let ArgBinding::Parameter(parameter) = arg {
            let value = parameter.value();
            let word: [u8; 4] = match parameter.kind() {
                ScalarKind::Bool => u32::from(value.as_bool()).to_le_bytes(),
                ScalarKind::Int => (value.as_i64() as i32).to_le_bytes(),
                ScalarKind::UInt => (value.as_i64() as u32).to_le_bytes(),
                _ => (value.as_f64() as f32).to_le_bytes(),
            };
            bytes.extend_from_slice(&word);
        }
    }
    bytes.extend_from_slice(&(items as u32).to_le_bytes());
    bytes
}

impl ComputeDevice for WgpuDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        self.context.capabilities()
    }

    fn compile(&self, plan: &KernelPlan) -> Result<Program> {
        if plan.config.dialect != Dialect::Wgsl {
            return Err(Error::compilation(
                &plan.name,
                format!("device compiles wgsl kernels, got {}", plan.config.dialect),
            ));
        }
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&plan.name),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&plan.source)),
        });
        let entries = Self::layout_entries(&plan.slots);
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&plan.name),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&plan.name),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&plan.name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::compilation(&plan.name, err.to_string()));
        }
        debug!(kernel = %plan.name, "compute pipeline created");
        Ok(Program::Wgpu(WgpuProgram {
            pipeline,
            bind_group_layout,
            workgroup_size: plan.config.workgroup_size,
        }))
    }

    fn enqueue(&self, kernel: &CompiledKernel, args: &[ArgBinding], work: WorkSize) -> Result<()> {
        let Program::Wgpu(program) = &kernel.program else {
            return Err(Error::dispatch(&kernel.name, "kernel was compiled for a different device"));
        };

        // Inputs are uploaded from host memory, so earlier writes must land first.
        let ids: Vec<BufferId> = args.iter().filter_map(|a| a.as_buffer().map(|b| b.id())).collect();
        if self.pending_writes_to(&ids) {
            self.synchronize()?;
        }

        let mut uploads = Vec::with_capacity(args.len());
        for (slot, (arg, expected)) in args.iter().zip(&kernel.slots).enumerate() {
            if let (ArgBinding::Buffer(buffer), ArgSlot::Buffer { access, .. }) = (arg, expected) {
                let label = format!("{} a{slot}", kernel.name);
                let gpu = self
                    .context
                    .create_storage_buffer(&label, buffer.read().as_bytes(), *access);
                uploads.push((slot, *access, buffer.clone(), gpu));
            }
        }
        let params = self.context.create_storage_buffer(
            &format!("{} params", kernel.name),
            &params_block(args, work.items),
            Access::ReadOnly,
        );

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = uploads
            .iter()
            .map(|(slot, _, _, gpu)| wgpu::BindGroupEntry {
                binding: *slot as u32,
                resource: gpu.as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: wgsl_params_binding(kernel.slots.len()),
            resource: params.as_entire_binding(),
        });

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&kernel.name),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&kernel.name),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&kernel.name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = work.items.div_ceil(program.workgroup_size as usize);
            pass.dispatch_workgroups(groups as u32, 1, 1);
        }

        let mut readbacks = Vec::new();
        for (slot, access, buffer, gpu) in &uploads {
            if *access == Access::ReadWrite {
                let len = buffer.read().as_bytes().len();
                let bytes = padded_size(len);
                let staging = self
                    .context
                    .create_staging_buffer(&format!("{} staging a{slot}", kernel.name), bytes);
                encoder.copy_buffer_to_buffer(gpu, 0, &staging, 0, bytes);
                readbacks.push(Readback {
                    kernel: kernel.name.clone(),
                    buffer: buffer.clone(),
                    staging,
                    bytes,
                    len,
                });
            }
        }
        self.context.queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::dispatch(&kernel.name, err.to_string()));
        }
        trace!(kernel = %kernel.name, items = work.items, "dispatch submitted");
        self.pending.lock().extend(readbacks);
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        let readbacks = std::mem::take(&mut *self.pending.lock());
        if readbacks.is_empty() {
            return Ok(());
        }
        for readback in &readbacks {
            readback
                .staging
                .slice(..readback.bytes)
                .map_async(wgpu::MapMode::Read, |_| {});
        }
        self.context.wait()?;

        // Every host buffer must still match its staging copy before any
        // is written back.
        let resized = readbacks
            .iter()
            .find(|r| r.buffer.read().as_bytes().len() != r.len);
        if let Some(readback) = resized {
            for readback in &readbacks {
                readback.staging.unmap();
            }
            return Err(Error::dispatch(
                &readback.kernel,
                format!("buffer {:?} was resized before synchronization", readback.buffer.id()),
            ));
        }

        for readback in readbacks {
            let slice = readback.staging.slice(..readback.bytes);
            let mapped = slice.get_mapped_range();
            let copied = readback.buffer.write().copy_from_bytes(&mapped[..readback.len]);
            drop(mapped);
            readback.staging.unmap();
            debug_assert!(copied, "readback length checked above");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tessera_foundation::{MemoryBuffer, ScalarValue};
    use tessera_ir::{KernelConfig, Parameter, ops};

    use super::*;
    use crate::compiler::Output;
    use crate::engine::ExecutionContext;

    #[test]
    fn params_block_is_packed_with_trailing_count() {
        let flag = Parameter::new(ScalarKind::Bool, ScalarValue::Bool(true));
        let dt = Parameter::real(0.5);
        let u = MemoryBuffer::from_vec(vec![0.0f32; 4]);
        let args = [
            ArgBinding::Buffer(u),
            ArgBinding::Parameter(flag),
            ArgBinding::Parameter(dt),
        ];
        let bytes = params_block(&args, 7);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &7u32.to_le_bytes());
    }

    #[test]
    #[ignore = "requires GPU"]
    fn gpu_axpy_matches_host() {
        let mut ctx = ExecutionContext::gpu().unwrap();
        let u = MemoryBuffer::from_vec(vec![1.0f32, 2.0, 3.0, 4.0]);
        let v = MemoryBuffer::from_vec(vec![1.0f32; 4]);
        let dt = Parameter::real(0.5);
        let value = ops::add(&ops::buffer(&u), &ops::mul(&ops::param(&dt), &ops::buffer(&v)).unwrap()).unwrap();
        let kernel = ctx.compile(&[Output::new(&u, value)]).unwrap();
        ctx.dispatch(&kernel).unwrap();
        assert_eq!(ctx.read_back::<f32>(&u).unwrap(), vec![1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    #[ignore = "requires GPU"]
    fn opencl_plans_are_rejected() {
        let mut ctx = ExecutionContext::gpu().unwrap();
        let u = MemoryBuffer::from_vec(vec![1.0f32; 4]);
        let config = KernelConfig {
            supports_double: false,
            supports_int64: false,
            ..KernelConfig::default()
        };
        let err = ctx.compile_with(&[Output::new(&u, ops::buffer(&u))], &config).unwrap_err();
        assert!(matches!(err, Error::Compilation { .. }));
    }

    #[test]
    #[ignore = "requires GPU"]
    fn resized_destinations_fail_synchronize_without_writes() {
        let mut ctx = ExecutionContext::gpu().unwrap();
        let a = MemoryBuffer::from_vec(vec![1.0f32; 4]);
        let u = MemoryBuffer::from_vec(vec![0.0f32; 4]);
        let v = MemoryBuffer::from_vec(vec![0.0f32; 4]);
        let kernel = ctx
            .compile(&[Output::new(&u, ops::buffer(&a)), Output::new(&v, ops::buffer(&a))])
            .unwrap();
        ctx.enqueue(&kernel).unwrap();
        v.resize(2).unwrap();

        assert!(matches!(ctx.synchronize(), Err(Error::Dispatch { .. })));
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![0.0; 4]);
        assert_eq!(v.to_vec::<f32>().unwrap(), vec![0.0; 2]);
    }
}
