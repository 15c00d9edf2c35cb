//! CLI command implementations

pub mod config;
pub mod serve;
pub mod worker;

pub use config::execute as config;
pub use serve::execute as serve;
pub use worker::execute as worker;
