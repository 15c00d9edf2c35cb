//! Worker command - one supervised build, then exit
//!
//! Spawned by the server with stdin/stdout wired to the supervisor.
//! Deliberately skips configuration and logging setup: everything a
//! build needs arrives in the start order, and stdout belongs to the
//! protocol.

use crate::build::worker;
use crate::error::BaleResult;

/// Execute the worker command
pub async fn execute() -> BaleResult<()> {
    worker::run().await
}
