//! Serve command - run the bundling server

use crate::build::{BuildCoordinator, WorkerSupervisor};
use crate::cache::ArtifactCache;
use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::error::{BaleError, BaleResult};
use crate::registry::RegistryClient;
use crate::server::{self, AppState};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Execute the serve command
pub async fn execute(args: ServeArgs, mut config: Config, verbose: u8) -> BaleResult<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(registry) = args.registry {
        config.registry.url = registry;
    }
    if let Some(tmp_dir) = args.tmp_dir {
        config.build.tmp_dir = tmp_dir;
    }

    // The scratch space is disposable, and the log file lives inside it
    // by default, so reset comes before the log file opens.
    reset_tmp_dir(&config.build.tmp_dir).await?;

    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| config.build.tmp_dir.join("log"));
    init_logging(&log_path, verbose)?;

    info!("starting bale {}", env!("CARGO_PKG_VERSION"));
    info!("registry: {}", config.registry.url);
    info!("scratch dir: {}", config.build.tmp_dir.display());

    let registry = RegistryClient::new(
        config.registry.url.clone(),
        Duration::from_secs(config.registry.timeout_secs),
    )?;
    let cache = Arc::new(ArtifactCache::new(config.cache.max_bytes as usize));
    let supervisor = WorkerSupervisor::from_config(&config.build)?;
    let coordinator = Arc::new(BuildCoordinator::new(cache, Arc::new(supervisor)));

    let state = AppState::new(Arc::new(config), registry, coordinator, log_path);
    server::run(state).await
}

async fn reset_tmp_dir(tmp_dir: &Path) -> BaleResult<()> {
    match fs::remove_dir_all(tmp_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(BaleError::io(
                format!("clearing scratch dir {}", tmp_dir.display()),
                e,
            ))
        }
    }
    fs::create_dir_all(tmp_dir)
        .await
        .map_err(|e| BaleError::io(format!("creating scratch dir {}", tmp_dir.display()), e))
}

/// Log to stderr and to the file backing `/_log`.
fn init_logging(log_path: &Path, verbose: u8) -> BaleResult<()> {
    let filter = match verbose {
        0 => EnvFilter::new("bale=info"),
        1 => EnvFilter::new("bale=debug"),
        _ => EnvFilter::new("bale=trace"),
    };

    let file = File::create(log_path)
        .map_err(|e| BaleError::io(format!("opening log file {}", log_path.display()), e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Arc::new(file)))
        .init();
    Ok(())
}
