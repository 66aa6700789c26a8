//! Engine configuration.
//!
//! ```json
//! {
//!   "backend": "host",
//!   "kernel": { "vector_width": 4, "precision": "double" },
//!   "cache": { "capacity": 128 },
//!   "host": { "parallel_threshold": 8192 }
//! }
//! ```
//!
//! Every section is optional. Without a `kernel` section the kernel config
//! is derived from the selected device. `TESSERA_BACKEND` overrides
//! `backend` when loading through [`EngineConfig::load`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use tessera_gpu::{ExecutionContext, HostDevice, HostOptions};
use tessera_ir::KernelConfig;

use crate::error::ConfigError;

/// Environment variable selecting the backend.
pub const BACKEND_ENV: &str = "TESSERA_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Host,
    /// Requires the `gpu` feature.
    Gpu,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(BackendKind::Host),
            "gpu" | "wgpu" => Ok(BackendKind::Gpu),
            _ => Err(ConfigError::UnknownBackend(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached kernels, unbounded when absent.
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Dispatches with fewer elements run on the calling thread.
    pub parallel_threshold: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: HostOptions::default().parallel_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Default config for compiled kernels, derived from the device when absent.
    pub kernel: Option<KernelConfig>,
    pub cache: CacheConfig,
    pub host: HostConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// [`from_path`](Self::from_path) followed by the environment override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_path(path)?.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_backend_override(std::env::var(BACKEND_ENV).ok().as_deref())
    }

    /// Apply a backend override value, as read from `TESSERA_BACKEND`.
    pub fn with_backend_override(mut self, value: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.backend = BackendKind::parse(value)?;
        }
        Ok(self)
    }

    /// Open the configured device and wrap it in a context.
    pub fn build_context(&self) -> Result<ExecutionContext, ConfigError> {
        let device: Box<dyn tessera_gpu::ComputeDevice> = match self.backend {
            BackendKind::Host => Box::new(HostDevice::with_options(HostOptions {
                parallel_threshold: self.host.parallel_threshold,
                ..HostOptions::default()
            })),
            #[cfg(feature = "gpu")]
            BackendKind::Gpu => Box::new(tessera_gpu::WgpuDevice::new()?),
            #[cfg(not(feature = "gpu"))]
            BackendKind::Gpu => return Err(tessera_gpu::Error::FeatureNotEnabled.into()),
        };
        info!(backend = ?self.backend, device = %device.capabilities().name, "execution context created");
        let ctx = match &self.kernel {
            Some(kernel) => ExecutionContext::with_config(device, kernel.clone())?,
            None => ExecutionContext::new(device),
        };
        Ok(ctx.with_cache_capacity(self.cache.capacity))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tessera_foundation::Precision;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.host.parallel_threshold, 4096);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "kernel": { "vector_width": 4, "precision": "double" }, "cache": { "capacity": 8 } }"#,
        )
        .unwrap();
        let kernel = config.kernel.unwrap();
        assert_eq!(kernel.vector_width, 4);
        assert_eq!(kernel.precision, Precision::Double);
        assert_eq!(kernel.workgroup_size, 64);
        assert_eq!(config.cache.capacity, Some(8));
    }

    #[test]
    fn unknown_backend_names_fail_to_parse() {
        let err = EngineConfig::from_json_str(r#"{ "backend": "fpga" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn backend_override() {
        let config = EngineConfig::default();
        assert_eq!(
            config.clone().with_backend_override(Some("GPU")).unwrap().backend,
            BackendKind::Gpu
        );
        assert_eq!(config.clone().with_backend_override(Some("")).unwrap().backend, BackendKind::Host);
        assert!(matches!(
            config.with_backend_override(Some("tpu")),
            Err(ConfigError::UnknownBackend(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "host": {{ "parallel_threshold": 16 }} }}"#).unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.host.parallel_threshold, 16);

        let missing = EngineConfig::from_path(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn builds_a_host_context() {
        let config = EngineConfig::from_json_str(r#"{ "cache": { "capacity": 2 } }"#).unwrap();
        let ctx = config.build_context().unwrap();
        assert_eq!(ctx.capabilities().name, "host");
        assert_eq!(ctx.cache().capacity(), Some(2));
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_needs_the_feature() {
        let config = EngineConfig {
            backend: BackendKind::Gpu,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.build_context(),
            Err(ConfigError::Engine(tessera_gpu::Error::FeatureNotEnabled))
        ));
    }
}
