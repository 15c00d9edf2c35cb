//! Error types for Bale
//!
//! All modules use `BaleResult<T>` as their return type.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Bale operations
pub type BaleResult<T> = Result<T, BaleError>;

/// All errors that can occur in Bale
#[derive(Error, Debug)]
pub enum BaleError {
    // Request errors
    #[error("Invalid module ID")]
    InvalidModuleId(String),

    #[error("unsupported option {key}={value}")]
    InvalidOption { key: String, value: String },

    // Resolution errors
    #[error("invalid module {0}: registry has no published versions")]
    UnknownPackage(String),

    #[error("invalid tag {tag} for {package}")]
    InvalidTag { package: String, tag: String },

    #[error("no version of {package} matches {tag}")]
    NoMatchingVersion { package: String, tag: String },

    #[error("registry lookup failed for {package}: {reason}")]
    RegistryFetch { package: String, reason: String },

    // Build errors (raised inside the worker process)
    #[error("fetch of {url} timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    #[error("fetch of {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("dependency install failed for {package}: {detail}")]
    InstallFailed { package: String, detail: String },

    #[error("could not resolve entry for {package}: tried {tried}")]
    EntryNotFound { package: String, tried: String },

    #[error("bundling failed for {package}: {reason}")]
    BundleFailed { package: String, reason: String },

    // Supervisor errors
    #[error("build failed: {message}")]
    BuildFailed {
        message: String,
        detail: Option<String>,
    },

    #[error("build worker crashed: {reason}")]
    WorkerCrashed { reason: String },

    #[error("build worker exceeded {secs}s timeout")]
    WorkerTimeout { secs: u64 },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BaleError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a registry fetch error
    pub fn registry_fetch(package: impl Into<String>, reason: impl ToString) -> Self {
        Self::RegistryFetch {
            package: package.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a bundle failed error
    pub fn bundle_failed(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BundleFailed {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status this error maps to: bad input is the caller's fault,
    /// everything else is ours
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidModuleId(_)
            | Self::InvalidOption { .. }
            | Self::UnknownPackage(_)
            | Self::InvalidTag { .. }
            | Self::NoMatchingVersion { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RegistryFetch { .. } => Some("Check registry.url in config.toml"),
            Self::ConfigInvalid { .. } => {
                Some("Fix the TOML syntax or delete the file to use defaults")
            }
            _ => None,
        }
    }
}
