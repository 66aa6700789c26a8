//! Stable hashing for kernel signatures.
//!
//! Compiled kernels are named after the hash of their structural signature,
//! so the hash has to be identical across runs, platforms and toolchain
//! versions. `std`'s `DefaultHasher` gives no such guarantee; FNV-1a does.
//!
//! NOTE: FNV-1a is **not** cryptographically secure. Cache lookups compare
//! the full canonical signature text, the hash only names the kernel.

/// 64-bit FNV-1a offset basis.
pub const FNV1A_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
/// 64-bit FNV-1a prime.
pub const FNV1A_PRIME_64: u64 = 0x0000_0100_0000_01B3;

/// Mix bytes into an existing FNV-1a 64-bit hash state.
#[inline]
pub const fn fnv1a64_mix(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0usize;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV1A_PRIME_64);
        i += 1;
    }
    hash
}

/// Hash a byte slice with FNV-1a 64-bit.
#[inline]
pub const fn fnv1a64(bytes: &[u8]) -> u64 {
    fnv1a64_mix(FNV1A_OFFSET_BASIS_64, bytes)
}

/// Incremental FNV-1a hasher.
///
/// Every write is length- or tag-delimited so that `("ab", "c")` and
/// `("a", "bc")` hash differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableHasher {
    state: u64,
}

impl StableHasher {
    /// Start a fresh hash.
    pub const fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS_64,
        }
    }

    /// Mix a single tag byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.state = fnv1a64_mix(self.state, &[value]);
        self
    }

    /// Mix a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.state = fnv1a64_mix(self.state, &value.to_le_bytes());
        self
    }

    /// Mix a string, prefixed by its length.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_u64(value.len() as u64);
        self.state = fnv1a64_mix(self.state, value.as_bytes());
        self
    }

    /// Current hash value.
    pub const fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canonical FNV-1a vectors. A change here breaks every persisted
    /// kernel name.
    #[test]
    fn fnv1a64_reference_values() {
        assert_eq!(fnv1a64(b""), FNV1A_OFFSET_BASIS_64);

        let expected_a = (FNV1A_OFFSET_BASIS_64 ^ 0x61).wrapping_mul(FNV1A_PRIME_64);
        assert_eq!(fnv1a64(b"a"), expected_a);

        assert_eq!(fnv1a64(b"hello"), 11831194018420276491);
        assert_eq!(fnv1a64(b"hello world"), 8618312879776256743);
    }

    #[test]
    fn hasher_string_writes_are_delimited() {
        let mut left = StableHasher::new();
        left.write_str("ab").write_str("c");

        let mut right = StableHasher::new();
        right.write_str("a").write_str("bc");

        assert_ne!(left.finish(), right.finish());
    }

    #[test]
    fn hasher_is_deterministic() {
        let hash = |s: &str| {
            let mut h = StableHasher::new();
            h.write_u8(7).write_str(s).write_u64(42);
            h.finish()
        };
        assert_eq!(hash("kernel"), hash("kernel"));
        assert_ne!(hash("kernel"), hash("kernels"));
    }
}
