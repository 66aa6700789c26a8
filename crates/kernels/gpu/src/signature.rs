//! Structural kernel signatures.
//!
//! The canonical text fully describes a kernel's shape: node tags and kinds
//! in post-order with back-references for shared nodes, argument slot
//! layout, inlined literal values, hoisting flags, output order and the
//! kernel configuration. Parameter values and buffer identities are not
//! part of it. Equality compares the full text, so a hash collision can
//! never alias two different kernels.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tessera_foundation::fnv1a64;

#[derive(Debug, Clone)]
pub struct Signature {
    hash: u64,
    canonical: Arc<str>,
}

impl Signature {
    pub fn new(canonical: String) -> Self {
        Self {
            hash: fnv1a64(canonical.as_bytes()),
            canonical: Arc::from(canonical),
        }
    }

    /// FNV-1a hash of the canonical text.
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Kernel entry point name derived from the hash.
    pub fn kernel_name(&self) -> String {
        format!("tessera_{:016x}", self.hash)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.canonical == other.canonical
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_equal_signature() {
        let a = Signature::new("k1|n0=buf:f:s0:0;".into());
        let b = Signature::new("k1|n0=buf:f:s0:0;".into());
        assert_eq!(a, b);
        assert_eq!(a.kernel_name(), b.kernel_name());
        assert!(a.kernel_name().starts_with("tessera_"));
    }

    #[test]
    fn different_text_different_signature() {
        let a = Signature::new("k1|n0=buf:f:s0:0;".into());
        let b = Signature::new("k1|n0=buf:d:s0:0;".into());
        assert_ne!(a, b);
    }
}
