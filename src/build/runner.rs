//! Build runner abstraction
//!
//! The coordinator only needs "run this task to a bundled source string";
//! keeping that behind a trait lets tests substitute deterministic
//! runners for the real subprocess supervisor.

use crate::cache::CacheKey;
use crate::error::BaleResult;
use async_trait::async_trait;

use super::protocol::BuildParams;

/// One build to execute: the artifact key plus the worker's parameters
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub key: CacheKey,
    pub params: BuildParams,
}

/// Executes one build task to completion
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run the task and return the bundled (uncompressed) source.
    ///
    /// Implementations must not leave processes behind, whatever the
    /// outcome.
    async fn run(&self, task: &BuildTask) -> BaleResult<String>;
}
