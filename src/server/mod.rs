//! HTTP server assembly
//!
//! Routing is deliberately small: the index, two debug endpoints, and
//! a catch-all that serves static assets or packages. Everything the
//! handlers need travels in one cloneable `AppState`.

pub mod bundle;
pub mod debug;
pub mod responses;
pub mod statics;

use crate::build::BuildCoordinator;
use crate::config::schema::Config;
use crate::error::{BaleError, BaleResult};
use crate::registry::RegistryClient;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: RegistryClient,
    pub coordinator: Arc<BuildCoordinator>,
    pub log_path: Arc<PathBuf>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: RegistryClient,
        coordinator: Arc<BuildCoordinator>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            config,
            registry,
            coordinator,
            log_path: Arc::new(log_path),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(statics::index))
        .route("/_log", get(debug::log_tail))
        .route("/_cache", get(debug::cache_contents))
        .fallback(get(bundle::serve_path))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run(state: AppState) -> BaleResult<()> {
    let bind = state.config.server.bind.clone();
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| BaleError::io(format!("binding {bind}"), e))?;

    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| BaleError::io("serving http", e))
}

/// One line per request, common-log flavored
async fn access_log(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let http_version = request.version();

    let response = next.run(request).await;

    info!(
        "{} - - \"{} {} {:?}\" {}",
        addr.ip(),
        method,
        uri,
        http_version,
        response.status().as_u16()
    );
    response
}
