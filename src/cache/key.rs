//! Artifact cache key derivation
//!
//! The key identifies one buildable artifact: package, pinned version,
//! optional deep entry path, and the normalized option set. The hashed
//! serialization carries a scheme version so a future change to the key
//! shape can never alias entries produced under the old shape.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Bump when the serialization below changes shape
const KEY_SCHEME_VERSION: u32 = 1;

/// Opaque fixed-length artifact identifier (16 hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a resolved build.
    ///
    /// Options are iterated in key order, so insertion order never
    /// changes the result. Slashes in the deep path are flattened to
    /// dashes before hashing.
    pub fn build(
        qualified: &str,
        version: &str,
        deep_path: Option<&str>,
        options: &BTreeMap<String, String>,
    ) -> Self {
        let mut ident = format!("v{KEY_SCHEME_VERSION}|{qualified}@{version}");
        if let Some(deep) = deep_path {
            ident.push('_');
            ident.push_str(&deep.replace('/', "-"));
        }
        if !options.is_empty() {
            ident.push('?');
            let pairs: Vec<String> = options.iter().map(|(k, v)| format!("{k}={v}")).collect();
            ident.push_str(&pairs.join("&"));
        }

        let digest = Sha256::digest(ident.as_bytes());
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
