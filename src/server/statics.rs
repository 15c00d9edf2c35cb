//! Index page and static assets

use crate::server::AppState;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Served when the public directory has no index.html
const FALLBACK_INDEX: &str = "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<title>bale</title></head>\n<body><h1>bale __VERSION__</h1>\
<p>Request <code>/package-name</code> to get a bundled build.</p></body></html>\n";

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Response {
    let path = state.config.server.public_dir.join("index.html");
    let page = match fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(_) => FALLBACK_INDEX.to_string(),
    }
    .replace("__VERSION__", state.version);

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        page,
    )
        .into_response()
}

/// Serve `path` from the public directory if a matching file exists.
pub async fn try_serve(state: &AppState, path: &str) -> Option<Response> {
    let relative = sanitize(path)?;
    let full = state.config.server.public_dir.join(relative);

    let meta = fs::metadata(&full).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let bytes = fs::read(&full).await.ok()?;

    let cache_control = format!("max-age={}", state.config.server.static_max_age_secs);
    Some(
        (
            StatusCode::OK,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type(&full)),
                ),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_str(&cache_control).ok()?,
                ),
            ],
            bytes,
        )
            .into_response(),
    )
}

/// Normalize a request path to a safe relative path, refusing anything
/// that could step out of the public directory.
fn sanitize(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let mut clean = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("ico") => "image/x-icon",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
