//! Kernel configuration.
//!
//! A [`KernelConfig`] is the read-only context every render call receives.
//! The same graph renders to different source under different configs, and
//! each config field is part of the kernel's structural signature.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tessera_foundation::{Precision, ScalarKind};

/// Target source dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// OpenCL C.
    #[default]
    OpenCl,
    /// WebGPU shading language.
    Wgsl,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::OpenCl => "opencl",
            Dialect::Wgsl => "wgsl",
        })
    }
}

/// Vector widths the renderer can emit.
pub const VECTOR_WIDTHS: [u32; 5] = [1, 2, 4, 8, 16];

/// Hardware capabilities reported by a device, consumed when deriving or
/// validating a [`KernelConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub name: String,
    /// Dialect the device compiles natively.
    pub preferred_dialect: Dialect,
    pub supports_double: bool,
    pub supports_int64: bool,
    pub max_vector_width: u32,
    /// Maximum bound buffers plus parameters per kernel.
    pub max_kernel_args: usize,
    pub max_workgroup_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("vector width {width} is not one of {VECTOR_WIDTHS:?}")]
    UnsupportedVectorWidth { width: u32 },

    #[error("WGSL vectors have at most 4 components, width {width} requested")]
    WgslVectorWidth { width: u32 },

    #[error("double precision requested but {device} does not support f64")]
    DoubleUnsupported { device: String },

    #[error("64-bit integers enabled but {device} does not support them")]
    Int64Unsupported { device: String },

    #[error("workgroup size must be non-zero")]
    ZeroWorkgroup,

    #[error("{what} {requested} exceeds the device limit of {limit}")]
    ExceedsDevice {
        what: &'static str,
        requested: u64,
        limit: u64,
    },
}

/// Immutable rendering context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub dialect: Dialect,
    /// Elements processed per work item.
    pub vector_width: u32,
    /// Width of `Real`.
    pub precision: Precision,
    pub supports_double: bool,
    pub supports_int64: bool,
    pub workgroup_size: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::OpenCl,
            vector_width: 1,
            precision: Precision::Single,
            supports_double: true,
            supports_int64: true,
            workgroup_size: 64,
        }
    }
}

impl KernelConfig {
    /// The configuration a device supports out of the box: scalar kernels,
    /// single precision, the device's own capability flags.
    pub fn for_device(caps: &DeviceCapabilities) -> Self {
        Self {
            dialect: caps.preferred_dialect,
            vector_width: 1,
            precision: Precision::Single,
            supports_double: caps.supports_double,
            supports_int64: caps.supports_int64,
            workgroup_size: caps.max_workgroup_size.clamp(1, 64),
        }
    }

    pub fn with_vector_width(mut self, width: u32) -> Self {
        self.vector_width = width;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn is_vectorized(&self) -> bool {
        self.vector_width > 1
    }

    /// Internal consistency checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VECTOR_WIDTHS.contains(&self.vector_width) {
            return Err(ConfigError::UnsupportedVectorWidth {
                width: self.vector_width,
            });
        }
        if self.dialect == Dialect::Wgsl && self.vector_width > 4 {
            return Err(ConfigError::WgslVectorWidth {
                width: self.vector_width,
            });
        }
        if self.precision == Precision::Double && !self.supports_double {
            return Err(ConfigError::DoubleUnsupported {
                device: "this configuration".into(),
            });
        }
        if self.workgroup_size == 0 {
            return Err(ConfigError::ZeroWorkgroup);
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the limits of a concrete device.
    pub fn validate_for(&self, caps: &DeviceCapabilities) -> Result<(), ConfigError> {
        self.validate()?;
        if self.supports_double && !caps.supports_double {
            return Err(ConfigError::DoubleUnsupported {
                device: caps.name.clone(),
            });
        }
        if self.supports_int64 && !caps.supports_int64 {
            return Err(ConfigError::Int64Unsupported {
                device: caps.name.clone(),
            });
        }
        if self.vector_width > caps.max_vector_width {
            return Err(ConfigError::ExceedsDevice {
                what: "vector width",
                requested: u64::from(self.vector_width),
                limit: u64::from(caps.max_vector_width),
            });
        }
        if self.workgroup_size > caps.max_workgroup_size {
            return Err(ConfigError::ExceedsDevice {
                what: "workgroup size",
                requested: u64::from(self.workgroup_size),
                limit: u64::from(caps.max_workgroup_size),
            });
        }
        Ok(())
    }

    /// Config contribution to the structural signature.
    pub fn signature_fragment(&self) -> String {
        format!(
            "cfg:{}:w{}:{}:d{}:l{}:wg{}",
            self.dialect,
            self.vector_width,
            match self.precision {
                Precision::Single => "single",
                Precision::Double => "double",
            },
            u8::from(self.supports_double),
            u8::from(self.supports_int64),
            self.workgroup_size
        )
    }

    /// Whether values of `kind` can appear in a kernel under this config.
    pub fn supports_kind(&self, kind: ScalarKind) -> bool {
        match kind.resolve(self.precision) {
            ScalarKind::Double => self.supports_double && self.dialect == Dialect::OpenCl,
            ScalarKind::Long => self.supports_int64 && self.dialect == Dialect::OpenCl,
            _ => true,
        }
    }

    /// Scalar type name of `kind`.
    pub fn scalar_type_name(&self, kind: ScalarKind) -> &'static str {
        let kind = kind.resolve(self.precision);
        match self.dialect {
            Dialect::OpenCl => match kind {
                ScalarKind::Bool => "bool",
                ScalarKind::Int => "int",
                ScalarKind::UInt => "uint",
                ScalarKind::Long => "long",
                ScalarKind::Float => "float",
                _ => "double",
            },
            Dialect::Wgsl => match kind {
                ScalarKind::Bool => "bool",
                ScalarKind::Int => "i32",
                ScalarKind::UInt => "u32",
                ScalarKind::Long => "i64",
                ScalarKind::Float => "f32",
                _ => "f64",
            },
        }
    }

    /// Type name of a per-work-item value of `kind`: scalar at width 1,
    /// otherwise the dialect's vector type. OpenCL has no bool vectors, so
    /// boolean lanes are `intN` masks.
    pub fn type_name(&self, kind: ScalarKind) -> String {
        if !self.is_vectorized() {
            return self.scalar_type_name(kind).to_string();
        }
        let w = self.vector_width;
        match self.dialect {
            Dialect::OpenCl if kind == ScalarKind::Bool => format!("int{w}"),
            Dialect::OpenCl => format!("{}{w}", self.scalar_type_name(kind)),
            Dialect::Wgsl => format!("vec{w}<{}>", self.scalar_type_name(kind)),
        }
    }
}
