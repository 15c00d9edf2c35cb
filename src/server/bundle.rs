//! Package request handling
//!
//! The catch-all route: everything that is not the index page or a
//! known debug endpoint lands here. Legacy `/bundle/` URLs redirect to
//! their stripped form, static assets win over package names, and the
//! remainder goes through resolve → cache-or-build → respond.

use crate::build::{BuildParams, BuildSettings, BuildTask};
use crate::cache::CacheKey;
use crate::error::{BaleError, BaleResult};
use crate::registry::resolve_version;
use crate::request::PackageRequest;
use crate::server::debug::parse_query;
use crate::server::{responses, statics, AppState};
use axum::extract::State;
use axum::http::Uri;
use axum::response::Response;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Fallback handler for `GET /{...}`.
pub async fn serve_path(State(state): State<AppState>, uri: Uri) -> Response {
    let raw_path = uri.path();

    if let Some(rest) = raw_path.strip_prefix("/bundle/") {
        let location = match uri.query() {
            Some(query) => format!("/{rest}?{query}"),
            None => format!("/{rest}"),
        };
        return responses::redirect(&location);
    }

    if let Some(asset) = statics::try_serve(&state, raw_path).await {
        return asset;
    }

    let path = decode_path(raw_path);
    let options = parse_query(uri.query());

    match serve_package(&state, &path, options).await {
        Ok(response) => response,
        Err(err) => {
            if err.status().is_client_error() {
                warn!("{err}");
            } else {
                error!("{err}");
            }
            responses::error_response(&err)
        }
    }
}

async fn serve_package(
    state: &AppState,
    path: &str,
    options: BTreeMap<String, String>,
) -> BaleResult<Response> {
    let request = PackageRequest::parse(path, &options)?;
    let qualified = request.qualified_name();
    debug!("[{qualified}] requested package");

    let meta = state.registry.package(&qualified).await?;
    let version = resolve_version(&meta, &request.tag)?;

    // tags and ranges canonicalize so every client caches the same URL
    if version != request.tag {
        debug!("[{qualified}] resolved {} to {version}", request.tag);
        return Ok(responses::redirect(&request.canonical_path(&version)));
    }

    let version_meta = meta.version(&version).ok_or_else(|| {
        BaleError::Internal(format!(
            "registry document for {qualified} lost version {version}"
        ))
    })?;

    let key = CacheKey::build(
        &qualified,
        &version,
        request.deep_path.as_deref(),
        &request.options,
    );
    let task = BuildTask {
        params: BuildParams {
            key: key.as_str().to_string(),
            name: qualified.clone(),
            version: version.clone(),
            tarball_url: version_meta.dist.tarball.clone(),
            deep_path: request.deep_path.clone(),
            options: request.options.clone(),
            settings: BuildSettings::from(&state.config.build),
        },
        key,
    };

    let bytes = state.coordinator.obtain(task).await?;
    info!("[{qualified}] serving {} bytes", bytes.len());
    Ok(responses::bundle_response(bytes, &state.config.server.headers))
}

fn decode_path(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}
