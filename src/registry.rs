//! Package registry client and version resolution
//!
//! Metadata is never cached here. The cache layer keys on resolved
//! versions, so a repeat fetch can only change which version a tag
//! resolves to, never the contents of a built artifact.

use crate::error::{BaleError, BaleResult};
use semver::{Version, VersionReq};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Per-package registry document
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMeta {
    pub name: String,

    /// Published versions; absent on corrupt or placeholder documents
    #[serde(default)]
    pub versions: Option<BTreeMap<String, VersionMeta>>,

    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
}

/// Per-version registry entry
#[derive(Debug, Clone, Deserialize)]
pub struct VersionMeta {
    pub dist: DistMeta,
}

/// Distribution block of a version entry
#[derive(Debug, Clone, Deserialize)]
pub struct DistMeta {
    pub tarball: String,
}

impl PackageMeta {
    /// Look up the entry for a concrete version
    pub fn version(&self, version: &str) -> Option<&VersionMeta> {
        self.versions.as_ref().and_then(|v| v.get(version))
    }
}

/// Async registry metadata client
#[derive(Clone)]
pub struct RegistryClient {
    base: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> BaleResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BaleError::Internal(format!("building http client: {e}")))?;

        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Metadata URL for a qualified package name
    pub fn url_for(&self, qualified: &str) -> String {
        format!("{}/{}", self.base, urlencoding::encode(qualified))
    }

    /// Fetch the registry document for a package
    pub async fn package(&self, qualified: &str) -> BaleResult<PackageMeta> {
        let url = self.url_for(qualified);
        debug!("[{qualified}] fetching registry metadata from {url}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BaleError::registry_fetch(qualified, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BaleError::UnknownPackage(qualified.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| BaleError::registry_fetch(qualified, e))?;

        response
            .json::<PackageMeta>()
            .await
            .map_err(|e| BaleError::registry_fetch(qualified, format!("invalid metadata: {e}")))
    }
}

/// Resolve a tag, dist-tag, or semver range to a concrete published
/// version. Pure function of its inputs.
pub fn resolve_version(meta: &PackageMeta, tag: &str) -> BaleResult<String> {
    let versions = meta
        .versions
        .as_ref()
        .ok_or_else(|| BaleError::UnknownPackage(meta.name.clone()))?;

    // Concrete version requested and published: nothing to resolve.
    if Version::parse(tag).is_ok() && versions.contains_key(tag) {
        return Ok(tag.to_string());
    }

    if let Some(mapped) = meta.dist_tags.get(tag) {
        if versions.contains_key(mapped) {
            return Ok(mapped.clone());
        }
        return Err(BaleError::InvalidTag {
            package: meta.name.clone(),
            tag: tag.to_string(),
        });
    }

    let req = VersionReq::parse(tag).map_err(|_| BaleError::InvalidTag {
        package: meta.name.clone(),
        tag: tag.to_string(),
    })?;

    versions
        .keys()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| req.matches(v))
        .max()
        .map(|v| v.to_string())
        .ok_or_else(|| BaleError::NoMatchingVersion {
            package: meta.name.clone(),
            tag: tag.to_string(),
        })
}
