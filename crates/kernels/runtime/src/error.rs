//! Runtime errors.
//!
//! Engine errors raised while a method initializes or executes are wrapped
//! in a [`MethodError`] naming the method, so a failure deep inside a
//! method list is still attributable. The wrapped [`tessera_gpu::Error`]
//! is kept unmodified, including the kernel name and device diagnostic.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Lifecycle phase a method failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Execute => "execute",
        })
    }
}

#[derive(Debug, Error)]
#[error("{phase} of method `{method}` failed: {source}")]
pub struct MethodError {
    pub method: String,
    pub phase: Phase,
    #[source]
    pub source: tessera_gpu::Error,
}

impl MethodError {
    pub fn new(method: impl Into<String>, phase: Phase, source: tessera_gpu::Error) -> Self {
        Self {
            method: method.into(),
            phase,
            source,
        }
    }

    /// Classification of the underlying engine error.
    pub fn kind(&self) -> tessera_gpu::ErrorKind {
        self.source.kind()
    }
}

/// Failures loading an [`EngineConfig`](crate::EngineConfig) or building
/// its context.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown backend `{0}`, expected `host` or `gpu`")]
    UnknownBackend(String),

    #[error(transparent)]
    Engine(#[from] tessera_gpu::Error),
}

pub type Result<T> = std::result::Result<T, MethodError>;
