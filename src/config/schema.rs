//! Configuration schema for Bale
//!
//! Configuration is stored at `~/.config/bale/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Package registry settings
    pub registry: RegistryConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Build pipeline settings
    pub build: BuildConfig,

    /// Log settings
    pub log: LogConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,

    /// Directory of static assets (index page, favicon)
    pub public_dir: PathBuf,

    /// max-age for static assets, in seconds
    pub static_max_age_secs: u64,

    /// Expose the /_log and /_cache debug endpoints
    pub debug_endpoints: bool,

    /// Extra headers added to every bundle response
    pub headers: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Cache-Control".to_string(), "max-age=86400".to_string());
        Self {
            bind: "127.0.0.1:9000".to_string(),
            public_dir: PathBuf::from("public"),
            static_max_age_secs: 600,
            debug_endpoints: true,
            headers,
        }
    }
}

/// Package registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry base URL
    pub url: String,

    /// Metadata request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://registry.npmjs.org".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total budget for compressed artifacts, in bytes
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 128 * 1024 * 1024,
        }
    }
}

/// Build pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Scratch space for worker builds; reset on server start
    pub tmp_dir: PathBuf,

    /// Tarball download timeout in seconds
    pub fetch_timeout_secs: u64,

    /// Outer bound on a whole worker build, in seconds
    pub worker_timeout_secs: u64,

    /// Override the worker process argv (defaults to `<current-exe> worker`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_command: Option<Vec<String>>,

    /// Dependency installer argv, run in the extracted package directory
    pub install_command: Vec<String>,

    /// Static-linking bundler argv prefix
    pub link_command: Vec<String>,

    /// Dynamic-tracing bundler argv prefix
    pub trace_command: Vec<String>,

    /// Minifier argv; source on stdin, minified on stdout
    pub minify_command: Vec<String>,

    /// Extra environment variables for the installer
    pub install_env: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir().join("bale"),
            fetch_timeout_secs: 10,
            worker_timeout_secs: 120,
            worker_command: None,
            install_command: vec![
                "npm".to_string(),
                "install".to_string(),
                "--production".to_string(),
            ],
            link_command: vec!["rollup".to_string()],
            trace_command: vec!["browserify".to_string()],
            minify_command: vec![
                "terser".to_string(),
                "--compress".to_string(),
                "--mangle".to_string(),
            ],
            install_env: BTreeMap::new(),
        }
    }
}

/// Log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file path; defaults to `<tmp_dir>/log`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}
