//! Introspection endpoints, off by default in untrusted deployments
//!
//! `/_log` exposes the rolling log file, optionally filtered to one
//! package's `[name]`-tagged lines. `/_cache` renders what the artifact
//! cache currently holds. Both return 404 when
//! `server.debug_endpoints` is disabled.

use crate::server::responses::html_escape;
use crate::server::AppState;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::BTreeMap;
use tokio::fs;

/// `GET /_log[?filter=name]`
pub async fn log_tail(State(state): State<AppState>, options: RawOptions) -> Response {
    if !state.config.server.debug_endpoints {
        return StatusCode::NOT_FOUND.into_response();
    }

    let content = fs::read_to_string(state.log_path.as_ref())
        .await
        .unwrap_or_default();

    let body = match options.0.get("filter") {
        Some(name) => {
            let tag = format!("[{name}]");
            content
                .lines()
                .filter(|line| line.contains(&tag))
                .flat_map(|line| [line, "\n"])
                .collect()
        }
        None => content,
    };

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        body,
    )
        .into_response()
}

/// `GET /_cache[?sort=size]`
pub async fn cache_contents(State(state): State<AppState>, options: RawOptions) -> Response {
    if !state.config.server.debug_endpoints {
        return StatusCode::NOT_FOUND.into_response();
    }

    let cache = state.coordinator.cache();
    let mut entries = cache.entries();
    if options.0.get("sort").map(String::as_str) == Some("size") {
        entries.sort_by(|a, b| b.1.cmp(&a.1));
    }

    let mut html = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>bale cache</title></head>\n\
         <body><h1>Artifact cache</h1>\n<table border=\"1\">\n\
         <tr><th>key</th><th>compressed bytes</th></tr>\n",
    );
    for (key, bytes) in &entries {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{bytes}</td></tr>\n",
            html_escape(key.as_str())
        ));
    }
    html.push_str(&format!(
        "</table>\n<p>{} entries, {} of {} bytes used, {} builds in flight</p>\n</body></html>\n",
        entries.len(),
        cache.total_bytes(),
        cache.max_bytes(),
        state.coordinator.in_flight_len(),
    ));

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        html,
    )
        .into_response()
}

/// Loosely-parsed query options, tolerant of anything a client sends
pub struct RawOptions(pub BTreeMap<String, String>);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for RawOptions {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(parse_query(parts.uri.query())))
    }
}

/// Split a raw query string into decoded key/value pairs. Unlike the
/// strict form extractor this never rejects a request.
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    let Some(raw) = raw else {
        return options;
    };
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        options.insert(decode(key), decode(value));
    }
    options
}

fn decode(part: &str) -> String {
    match urlencoding::decode(part) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => part.to_string(),
    }
}
