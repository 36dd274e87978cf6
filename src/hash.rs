// src/hash.rs

//! Content hashing for build and package identities
//!
//! All identifiers produced by arbor (assertion hashes, BuildHash,
//! PackageHash, spec signatures, builder image tags) are lowercase hex
//! SHA-256 digests computed through [`Hasher`].
//!
//! Structured inputs are fed as framed fields so that two different field
//! sequences can never produce the same byte stream:
//!
//! ```text
//! <key>:<len>:<value>\n
//! ```

use sha2::{Digest, Sha256};

/// Length of a hex-encoded digest
pub const HEX_LEN: usize = 64;

/// Incremental SHA-256 hasher with field framing
#[derive(Clone, Default)]
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    /// Create a new hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher whose stream starts with a domain tag
    ///
    /// Different hash kinds use different tags so a BuildHash can never be
    /// confused with a PackageHash computed over the same inputs.
    pub fn with_domain(domain: &str) -> Self {
        let mut hasher = Self::new();
        hasher.field("domain", domain);
        hasher
    }

    /// Update the hasher with raw data
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Feed one framed `key`/`value` field
    pub fn field(&mut self, key: &str, value: &str) -> &mut Self {
        self.state.update(key.as_bytes());
        self.state.update(format!(":{}:", value.len()).as_bytes());
        self.state.update(value.as_bytes());
        self.state.update(b"\n");
        self
    }

    /// Finalize and return the lowercase hex digest
    pub fn finalize(self) -> String {
        format!("{:x}", self.state.finalize())
    }
}

/// Compute the SHA-256 hex digest of a byte slice
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hex digest of a string
#[inline]
pub fn hash_str(data: &str) -> String {
    hash_bytes(data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(
            hash_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hasher_matches_one_shot() {
        let mut hasher = Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), hash_str("hello world"));
    }

    #[test]
    fn test_field_framing_is_unambiguous() {
        let mut a = Hasher::new();
        a.field("k", "ab").field("k", "c");
        let mut b = Hasher::new();
        b.field("k", "a").field("k", "bc");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_domain_separates_hashes() {
        let mut build = Hasher::with_domain("build");
        build.field("package", "x@1");
        let mut package = Hasher::with_domain("package");
        package.field("package", "x@1");
        let (b, p) = (build.finalize(), package.finalize());
        assert_ne!(b, p);
        assert_eq!(b.len(), HEX_LEN);
    }
}
