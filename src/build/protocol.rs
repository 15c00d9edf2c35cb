//! Supervisor ↔ worker message protocol
//!
//! Newline-delimited JSON over the worker's stdin/stdout. The exchange
//! is strictly ordered: the worker announces `Ready`, the supervisor
//! answers with exactly one `Start`, the worker emits any number of
//! `Info` lines and then exactly one terminal `Result` or `Error`.

use crate::config::schema::BuildConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One protocol message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Worker is up and listening for its build order
    Ready,

    /// Supervisor hands over everything the build needs
    Start { params: BuildParams },

    /// Progress line, forwarded to the server log
    Info { message: String },

    /// Terminal failure with the failing step's message and source chain
    Error { message: String, trace: String },

    /// Terminal success carrying the bundled source
    Result { code: String },
}

/// Everything a worker needs to run one build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildParams {
    /// Cache key, also the scratch directory name
    pub key: String,

    /// Qualified package name, e.g. `@babel/core`
    pub name: String,

    /// Resolved concrete version
    pub version: String,

    /// Source archive location from the registry document
    pub tarball_url: String,

    /// Requested entry sub-path, if any
    pub deep_path: Option<String>,

    /// Normalized bundle options
    pub options: BTreeMap<String, String>,

    /// Build-pipeline settings snapshot
    pub settings: BuildSettings,
}

/// The subset of server configuration a worker needs; passed over the
/// wire so workers never read config files themselves
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSettings {
    pub tmp_dir: PathBuf,
    pub fetch_timeout_secs: u64,
    pub install_command: Vec<String>,
    pub install_env: BTreeMap<String, String>,
    pub link_command: Vec<String>,
    pub trace_command: Vec<String>,
    pub minify_command: Vec<String>,
}

impl From<&BuildConfig> for BuildSettings {
    fn from(config: &BuildConfig) -> Self {
        Self {
            tmp_dir: config.tmp_dir.clone(),
            fetch_timeout_secs: config.fetch_timeout_secs,
            install_command: config.install_command.clone(),
            install_env: config.install_env.clone(),
            link_command: config.link_command.clone(),
            trace_command: config.trace_command.clone(),
            minify_command: config.minify_command.clone(),
        }
    }
}
