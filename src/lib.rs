//! Bale - on-demand package bundling server
//!
//! Serves registry packages as single-file browser-ready bundles,
//! building and caching each one on first request.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod request;
pub mod server;

pub use error::{BaleError, BaleResult};
