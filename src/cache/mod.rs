//! Artifact caching
//!
//! Keys are one-way hashes of the resolved build identity (§`key`); the
//! store (§`store`) holds gzip-compressed bundles under a byte budget
//! with LRU eviction. Two requests share a key exactly when they would
//! produce byte-identical artifacts against the same registry state.

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::ArtifactCache;
