//! Build entry resolution and source classification
//!
//! Mirrors node-style resolution just far enough for published packages:
//! deep paths try the literal file, `.mjs`/`.js` suffixes, then a
//! directory index; manifest entries prefer the ES-module field and fall
//! back through the legacy ones.

use crate::error::{BaleError, BaleResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Fields of package.json the build pipeline cares about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub main: Option<String>,

    /// ES-module entry
    #[serde(default)]
    pub module: Option<String>,

    /// Pre-standard name for the same thing
    #[serde(rename = "jsnext:main", default)]
    pub jsnext_main: Option<String>,

    #[serde(rename = "peerDependencies", default)]
    pub peer_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Declared entry with ESM preference, defaulting to `index.js`
    pub fn declared_entry(&self) -> &str {
        self.module
            .as_deref()
            .or(self.jsnext_main.as_deref())
            .or(self.main.as_deref())
            .unwrap_or("index.js")
    }
}

/// Resolve the file the bundler should start from.
pub async fn resolve_entry(
    pkg_dir: &Path,
    manifest: &PackageManifest,
    deep_path: Option<&str>,
    package: &str,
) -> BaleResult<PathBuf> {
    match deep_path {
        Some(deep) => resolve_deep(pkg_dir, deep, package).await,
        None => resolve_declared(pkg_dir, manifest.declared_entry(), package).await,
    }
}

/// A requested sub-path: literal file, then suffixed, then directory index
async fn resolve_deep(pkg_dir: &Path, deep: &str, package: &str) -> BaleResult<PathBuf> {
    let base = pkg_dir.join(deep);
    let mut candidates = vec![
        base.clone(),
        append_extension(&base, "mjs"),
        append_extension(&base, "js"),
    ];
    if fs::metadata(&base).await.map(|m| m.is_dir()).unwrap_or(false) {
        candidates.push(base.join("index.mjs"));
        candidates.push(base.join("index.js"));
    }

    for candidate in &candidates {
        if let Ok(meta) = fs::metadata(candidate).await {
            if meta.is_file() {
                return Ok(candidate.clone());
            }
        }
    }

    Err(BaleError::EntryNotFound {
        package: package.to_string(),
        tried: candidates
            .iter()
            .map(|c| c.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// The manifest-declared entry: directories descend into `index.js`,
/// missing files retry with a `.js` suffix once
async fn resolve_declared(pkg_dir: &Path, declared: &str, package: &str) -> BaleResult<PathBuf> {
    let mut candidate = pkg_dir.join(declared);
    let mut tried = Vec::new();

    // Bounded: dir -> index.js and missing -> .js can only chain so far
    // in a real package tree.
    for _ in 0..8 {
        tried.push(candidate.display().to_string());
        match fs::metadata(&candidate).await {
            Ok(meta) if meta.is_dir() => candidate = candidate.join("index.js"),
            Ok(_) => return Ok(candidate),
            Err(_) => {
                if candidate.extension().map(|e| e == "js").unwrap_or(false) {
                    break;
                }
                candidate = append_extension(&candidate, "js");
            }
        }
    }

    Err(BaleError::EntryNotFound {
        package: package.to_string(),
        tried: tried.join(", "),
    })
}

/// `foo.min` + `js` = `foo.min.js` (set_extension would eat `.min`)
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    PathBuf::from(format!("{}.{ext}", path.display()))
}

/// Does the source use static import/export module syntax?
///
/// Line-level heuristic rather than a parse: strips comments, then looks
/// for lines opening with an import or export statement. Good enough to
/// pick a bundler strategy; a misclassification falls through to the
/// dynamic-tracing path anyway.
pub fn is_module_source(source: &str) -> bool {
    let mut in_block_comment = false;

    for raw in source.lines() {
        let mut line = raw.trim_start();

        if in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    line = line[end + 2..].trim_start();
                    in_block_comment = false;
                }
                None => continue,
            }
        }
        while let Some(start) = line.find("/*") {
            match line[start..].find("*/") {
                Some(end) => {
                    let rest = line[start + end + 2..].trim_start();
                    line = &line[..start];
                    if line.trim().is_empty() {
                        line = rest;
                    }
                }
                None => {
                    in_block_comment = true;
                    line = &line[..start];
                    break;
                }
            }
        }
        if line.starts_with("//") {
            continue;
        }

        if let Some(rest) = line.strip_prefix("import") {
            if rest.starts_with([' ', '\t', '"', '\'', '{', '*']) {
                return true;
            }
        }
        if let Some(rest) = line.strip_prefix("export") {
            if rest.starts_with([' ', '\t', '{', '*']) || rest.starts_with("default") {
                return true;
            }
        }
    }
    false
}

/// JavaScript reserved words that cannot name a UMD global
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Turn a package name into a legal identifier for the bundle's global:
/// dashes camel-case the following letter, anything else illegal becomes
/// an underscore, and reserved words or leading digits get a prefix.
pub fn legal_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;

    for c in name.chars() {
        if c == '-' {
            upper_next = true;
        } else if c.is_ascii_alphanumeric() || c == '$' || c == '_' {
            if upper_next {
                out.extend(c.to_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        } else {
            out.push('_');
            upper_next = false;
        }
    }

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || RESERVED.contains(&out.as_str())
    {
        out.insert(0, '_');
    }
    out
}
