//! Cache keys derived from a data domain plus request parameters

use std::fmt;

use sha2::{Digest, Sha256};

/// Number of hex characters of the parameter digest kept in the key
const DIGEST_HEX_LEN: usize = 16;

/// Identifies one cache slot
///
/// A key is `<domain>-<digest>`, where the digest covers the effective request
/// parameters. Two requests for the same domain only share a slot when their
/// parameters are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key for `domain` from ordered `(name, value)` parameter pairs
    ///
    /// Parameter values are trimmed and lowercased before hashing, so
    /// `"Kochi, Kerala"` and `" kochi, kerala"` share a slot.
    pub fn new(domain: &str, params: &[(&str, &str)]) -> Self {
        let mut hasher = Sha256::new();
        for (name, value) in params {
            update_field(&mut hasher, name);
            update_field(&mut hasher, &value.trim().to_lowercase());
        }
        let digest = hex::encode(hasher.finalize());
        Self(format!("{}-{}", domain, &digest[..DIGEST_HEX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Feeds one length-prefixed field so adjacent fields cannot run together
fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
