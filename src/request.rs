//! Inbound package request parsing
//!
//! A request path names a package (`left-pad`, `@babel/core@^7.0.0`,
//! `lodash@4.17.21/fp/curry`) and the query string carries bundle options.
//! Parsed once per request; immutable afterwards.

use crate::error::{BaleError, BaleResult};
use std::collections::BTreeMap;

/// Accepted values for the `format` option
const FORMATS: &[&str] = &["umd", "es"];

/// A parsed package request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Scope without the leading `@`, e.g. `babel` for `@babel/core`
    pub scope: Option<String>,
    /// Package name without scope
    pub name: String,
    /// Requested tag, range, or concrete version; `latest` if absent
    pub tag: String,
    /// Sub-path into the package requested as the build entry
    pub deep_path: Option<String>,
    /// Bundle options from the query string, sorted by key
    pub options: BTreeMap<String, String>,
}

impl PackageRequest {
    /// Parse a URL path (without query) plus query options.
    ///
    /// Accepted shapes: `name`, `name@tag`, `@scope/name@tag`, each
    /// optionally followed by `/deep/path`. Anything else is an invalid
    /// module ID.
    pub fn parse(path: &str, options: &BTreeMap<String, String>) -> BaleResult<Self> {
        let invalid = || BaleError::InvalidModuleId(path.to_string());

        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut segments = trimmed.split('/');
        let first = segments.next().ok_or_else(invalid)?;

        let (scope, name_tag) = if let Some(scope) = first.strip_prefix('@') {
            if scope.is_empty() || scope.contains('@') {
                return Err(invalid());
            }
            let name_tag = segments.next().ok_or_else(invalid)?;
            (Some(scope.to_string()), name_tag)
        } else {
            (None, first)
        };

        let (name, tag) = match name_tag.split_once('@') {
            Some((name, tag)) => (name, tag),
            None => (name_tag, "latest"),
        };
        if name.is_empty() || tag.is_empty() || name.contains('@') {
            return Err(invalid());
        }

        let rest: Vec<&str> = segments.collect();
        if rest.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        let deep_path = if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        };

        if let Some(format) = options.get("format") {
            if !FORMATS.contains(&format.as_str()) {
                return Err(BaleError::InvalidOption {
                    key: "format".to_string(),
                    value: format.clone(),
                });
            }
        }

        Ok(Self {
            scope,
            name: name.to_string(),
            tag: tag.to_string(),
            deep_path,
            options: options.clone(),
        })
    }

    /// Scope-qualified package name, e.g. `@babel/core` or `left-pad`
    pub fn qualified_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{}/{}", scope, self.name),
            None => self.name.clone(),
        }
    }

    /// Canonical pinned-version path this request redirects to
    pub fn canonical_path(&self, version: &str) -> String {
        let mut path = format!("/{}@{}", self.qualified_name(), version);
        if let Some(deep) = &self.deep_path {
            path.push('/');
            path.push_str(deep);
        }
        path.push_str(&self.query_string());
        path
    }

    /// Options as a `?a=1&b=2` query string; keys are already sorted by
    /// the map, which keeps the canonical URL deterministic
    pub fn query_string(&self) -> String {
        if self.options.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = self
            .options
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        format!("?{}", pairs.join("&"))
    }
}
