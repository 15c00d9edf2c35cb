//! Response assembly
//!
//! Small constructors for the handful of response shapes the server
//! produces: the gzip bundle payload, 302 redirects, and error pages.
//! Redirects are built by hand because the stock helper emits 307 and
//! CDN clients expect a plain 302.

use crate::error::BaleError;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::warn;

const ERROR_TEMPLATE: &str = include_str!("../../templates/500.html");

/// `200` with the compressed artifact and its derived ETag.
pub fn bundle_response(bytes: Bytes, extra_headers: &BTreeMap<String, String>) -> Response {
    let etag = etag_for(&bytes);
    let mut response = (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/javascript; charset=utf-8"),
            ),
            (header::CONTENT_ENCODING, HeaderValue::from_static("gzip")),
            (
                header::ETAG,
                HeaderValue::from_str(&etag).unwrap_or(HeaderValue::from_static("\"invalid\"")),
            ),
        ],
        bytes,
    )
        .into_response();

    let headers = response.headers_mut();
    for (name, value) in extra_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("skipping invalid configured header {name}: {value}"),
        }
    }
    response
}

/// Plain `302`, not axum's 307 temporary redirect
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => error_response(&BaleError::Internal(format!(
            "redirect location not header-safe: {location}"
        ))),
    }
}

/// User errors as plain text, everything else as the error page.
pub fn error_response(err: &BaleError) -> Response {
    let status = err.status();
    if status.is_client_error() {
        return (status, err.to_string()).into_response();
    }

    let body = ERROR_TEMPLATE.replace("{{message}}", &html_escape(&err.to_string()));
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        body,
    )
        .into_response()
}

/// Quoted 16-hex prefix of the payload's SHA-256
pub fn etag_for(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("\"{}\"", hex::encode(&digest[..8]))
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
