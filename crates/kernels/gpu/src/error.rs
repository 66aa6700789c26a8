//! Engine error taxonomy.

use thiserror::Error;

use tessera_foundation::UsageError;
use tessera_ir::{ConfigError, TypeError};

/// Errors surfaced by kernel compilation, binding and dispatch.
///
/// Every variant raised for a specific kernel carries the kernel name and
/// the device diagnostic text. Nothing in the engine retries on error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Graph construction or output assignment rejected operand kinds.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Kernel configuration is inconsistent or exceeds the device.
    #[error("invalid kernel configuration: {0}")]
    Config(#[from] ConfigError),

    /// The device rejected the generated kernel.
    #[error("compilation of kernel `{kernel}` failed: {diagnostic}")]
    Compilation { kernel: String, diagnostic: String },

    /// Arguments do not match the cached kernel's fixed slots.
    #[error("binding error for kernel `{kernel}`: {message}")]
    Binding { kernel: String, message: String },

    /// Device unavailable or execution fault.
    #[error("dispatch of kernel `{kernel}` failed: {diagnostic}")]
    Dispatch { kernel: String, diagnostic: String },

    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Device discovery or creation failed.
    #[error("device error: {0}")]
    Device(String),

    /// GPU feature not enabled.
    #[error("GPU feature not enabled - compile with --features gpu")]
    FeatureNotEnabled,
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Type,
    Config,
    Compilation,
    Binding,
    Dispatch,
    Usage,
    Device,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Type(_) => ErrorKind::Type,
            Error::Config(_) => ErrorKind::Config,
            Error::Compilation { .. } => ErrorKind::Compilation,
            Error::Binding { .. } => ErrorKind::Binding,
            Error::Dispatch { .. } => ErrorKind::Dispatch,
            Error::Usage(_) => ErrorKind::Usage,
            Error::Device(_) | Error::FeatureNotEnabled => ErrorKind::Device,
        }
    }

    /// Name of the kernel the error refers to, if any.
    pub fn kernel(&self) -> Option<&str> {
        match self {
            Error::Compilation { kernel, .. } | Error::Binding { kernel, .. } | Error::Dispatch { kernel, .. } => {
                Some(kernel)
            }
            _ => None,
        }
    }

    pub(crate) fn compilation(kernel: &str, diagnostic: impl Into<String>) -> Self {
        Error::Compilation {
            kernel: kernel.to_string(),
            diagnostic: diagnostic.into(),
        }
    }

    pub(crate) fn binding(kernel: &str, message: impl Into<String>) -> Self {
        Error::Binding {
            kernel: kernel.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn dispatch(kernel: &str, diagnostic: impl Into<String>) -> Self {
        Error::Dispatch {
            kernel: kernel.to_string(),
            diagnostic: diagnostic.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
