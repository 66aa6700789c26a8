//! wgpu adapter, device and queue.
//!
//! [`GpuContext`] selects an adapter, opens a compute device and reports
//! the [`DeviceCapabilities`] kernel configs are validated against. WGSL
//! has no portable f64 or i64 support, so the capabilities report neither.

use tessera_ir::{DeviceCapabilities, Dialect};

use crate::device::Access;
use crate::error::{Error, Result};

/// Smallest storage binding size; wgpu rejects zero-sized bindings.
const MIN_BINDING_SIZE: u64 = 4;

pub struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    capabilities: DeviceCapabilities,
}

impl GpuContext {
    /// Open the default high-performance adapter.
    pub fn new() -> Result<Self> {
        Self::with_options(GpuContextOptions::default())
    }

    /// Open an adapter matching `options`.
    pub fn with_options(options: GpuContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::Device(format!("no compatible GPU adapter: {e}")))?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "GPU adapter selected"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Tessera GPU"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e: wgpu::RequestDeviceError| Error::Device(e.to_string()))?;

        let limits = device.limits();
        let capabilities = DeviceCapabilities {
            name: adapter_info.name.clone(),
            preferred_dialect: Dialect::Wgsl,
            supports_double: false,
            supports_int64: false,
            max_vector_width: 4,
            // One binding is reserved for the parameter block.
            max_kernel_args: (limits.max_storage_buffers_per_shader_stage as usize).saturating_sub(1),
            max_workgroup_size: limits.max_compute_invocations_per_workgroup,
        };

        Ok(Self {
            device,
            queue,
            adapter_info,
            capabilities,
        })
    }

    /// Adapter name for diagnostics.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Graphics backend the adapter runs on.
    pub fn backend(&self) -> wgpu::Backend {
        self.adapter_info.backend
    }

    /// Limits derived from the adapter.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Underlying wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Underlying wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Storage buffer initialised from `contents`.
    pub fn create_storage_buffer(&self, label: &str, contents: &[u8], access: Access) -> wgpu::Buffer {
        let usage = match access {
            Access::ReadOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            Access::ReadWrite => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
            }
        };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded_size(contents.len()),
            usage,
            mapped_at_creation: false,
        });
        if !contents.is_empty() {
            self.queue.write_buffer(&buffer, 0, contents);
        }
        buffer
    }

    /// Staging buffer for host readback.
    pub fn create_staging_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Block until all submitted work has finished.
    pub fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| Error::Device(e.to_string()))
    }
}

/// Byte size rounded up to the storage alignment of 4, and never zero.
pub(crate) fn padded_size(len: usize) -> u64 {
    (len as u64).div_ceil(4).max(1) * MIN_BINDING_SIZE
}

#[derive(Debug, Clone)]
pub struct GpuContextOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for GpuContextOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}
