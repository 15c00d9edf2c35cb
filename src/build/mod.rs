//! Build pipeline: coordination, supervision, and the worker itself
//!
//! Layered bottom-up: `exec` runs captured subprocesses, `entry` and
//! `bundle` implement the worker's bundling logic, `worker` is the
//! isolated per-build process, `supervisor` drives one worker over the
//! `protocol` messages, and `coordinator` fronts it all with the cache
//! and single-flight coalescing.

pub mod bundle;
pub mod coordinator;
pub mod entry;
pub mod exec;
pub mod protocol;
pub mod report;
pub mod runner;
pub mod supervisor;
pub mod worker;

pub use coordinator::BuildCoordinator;
pub use protocol::{BuildParams, BuildSettings};
pub use runner::{BuildRunner, BuildTask};
pub use supervisor::WorkerSupervisor;
