//! Build coordination
//!
//! The coordinator sits between the HTTP layer and the build runner:
//! cache hits return immediately, and concurrent misses for the same key
//! coalesce onto one shared build instead of racing. Builds run in a
//! detached task, so a request that gives up waiting never aborts the
//! build for everyone who arrives later. Failures propagate to every
//! waiter but are never cached; the next request starts fresh.

use crate::build::runner::{BuildRunner, BuildTask};
use crate::cache::{ArtifactCache, CacheKey};
use crate::error::{BaleError, BaleResult};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

type SharedBuild = Shared<BoxFuture<'static, Result<Bytes, BuildFailure>>>;

/// Snapshot of a failed build, cloneable to every coalesced waiter
#[derive(Debug, Clone)]
pub struct BuildFailure {
    message: String,
    detail: Option<String>,
}

impl BuildFailure {
    fn from_error(err: &BaleError) -> Self {
        match err {
            // already the supervisor's message/trace split
            BaleError::BuildFailed { message, detail } => Self {
                message: message.clone(),
                detail: detail.clone(),
            },
            other => Self {
                message: other.to_string(),
                detail: None,
            },
        }
    }

    fn into_error(self) -> BaleError {
        BaleError::BuildFailed {
            message: self.message,
            detail: self.detail,
        }
    }
}

pub struct BuildCoordinator {
    cache: Arc<ArtifactCache>,
    runner: Arc<dyn BuildRunner>,
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedBuild>>>,
}

impl BuildCoordinator {
    pub fn new(cache: Arc<ArtifactCache>, runner: Arc<dyn BuildRunner>) -> Self {
        Self {
            cache,
            runner,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The compressed artifact for `task`, from cache or from a build
    /// shared with any concurrent requester of the same key.
    pub async fn obtain(&self, task: BuildTask) -> BaleResult<Bytes> {
        if let Some(hit) = self.cache.get(&task.key) {
            debug!("cache hit for {}", task.key);
            return Ok(hit);
        }
        self.build_future(task)
            .await
            .map_err(BuildFailure::into_error)
    }

    /// Join the in-flight build for the key or start a new detached one.
    fn build_future(&self, task: BuildTask) -> SharedBuild {
        let mut in_flight = self.in_flight.lock().unwrap();

        // the artifact may have landed between the caller's cache check
        // and this lock
        if let Some(hit) = self.cache.get(&task.key) {
            return futures_util::future::ready(Ok(hit)).boxed().shared();
        }
        if let Some(existing) = in_flight.get(&task.key) {
            debug!("joining in-flight build for {}", task.key);
            return existing.clone();
        }

        info!("building {} ({})", task.params.name, task.key);
        let key = task.key.clone();
        let cache = Arc::clone(&self.cache);
        let runner = Arc::clone(&self.runner);
        let table = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            let outcome = match runner.run(&task).await {
                Ok(code) => match compress(code.as_bytes()) {
                    Ok(bytes) => {
                        cache.set(task.key.clone(), bytes.clone());
                        Ok(bytes)
                    }
                    Err(err) => Err(BuildFailure::from_error(&err)),
                },
                Err(err) => Err(BuildFailure::from_error(&err)),
            };
            // cache first, then retire the entry, so no moment exists
            // where the key is in neither table
            table.lock().unwrap().remove(&task.key);
            outcome
        });

        let shared: SharedBuild = handle
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(_) => Err(BuildFailure {
                    message: "build task panicked".to_string(),
                    detail: None,
                }),
            })
            .boxed()
            .shared();

        in_flight.insert(key, shared.clone());
        shared
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Number of builds currently running
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

fn compress(code: &[u8]) -> BaleResult<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(code)
        .map_err(|e| BaleError::io("compressing artifact", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| BaleError::io("compressing artifact", e))?;
    Ok(Bytes::from(compressed))
}
