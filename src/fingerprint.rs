//! Digests over canonical byte encodings.
//!
//! Provides deterministic hashing with domain separation and length prefixing,
//! so that digests of frozen values are identical across processes and builds
//! of the same crate version.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ----------------------------------------------------------------------------
// Domain separation constants
// ----------------------------------------------------------------------------

/// Domain for digests of frozen values (v1).
pub const DOMAIN_FROZEN_VALUE_V1: &[u8] = b"FROZEN_VALUE_V1";

/// Domain for configuration fingerprints (v1).
pub const DOMAIN_CONFIG_V1: &[u8] = b"CONFIG_V1";

/// SHA-256 digest of a canonical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    pub fn zero() -> Self {
        HashValue([0; 32])
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        HashValue(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Leading eight bytes, big-endian. This is the integer digest reported
    /// in hashing mode.
    pub fn to_u64(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(head)
    }

    /// SHA-256 over `"DFZ:" || domain || ":v1" || len(data) as u64 LE || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let digest = Sha256::new()
            .chain_update(b"DFZ:")
            .chain_update(domain)
            .chain_update(b":v1")
            .chain_update((data.len() as u64).to_le_bytes())
            .chain_update(data)
            .finalize();
        HashValue(digest.into())
    }
}

/// Lowercase hex of the first eight bytes.
impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Types with a deterministic byte encoding suitable for hashing.
pub trait Canonicalizable {
    /// Serialize to canonical byte representation.
    fn to_canonical_bytes(&self) -> Vec<u8>;

    /// Compute domain-separated hash of canonical bytes.
    fn fingerprint(&self, domain: &[u8]) -> HashValue {
        let bytes = self.to_canonical_bytes();
        HashValue::hash_with_domain(domain, &bytes)
    }
}

/// Appends a length-prefixed byte string.
pub(crate) fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}
