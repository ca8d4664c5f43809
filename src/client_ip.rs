//! Client IP extraction from proxy headers
//!
//! Headers are consulted in this order, first non-empty value wins:
//! - `X-Forwarded-For` (leftmost entry)
//! - `X-Real-IP`
//! - `CF-Connecting-IP`
//!
//! and the socket peer address is used otherwise. Header values are not
//! validated as IP addresses; the caller sees whatever the proxy sent.
//!
//! A present but blank header counts as absent. For `X-Forwarded-For` only
//! the leftmost entry is looked at, so `", 1.2.3.4"` falls through to the
//! next header instead of yielding `1.2.3.4` or an empty IP.

use axum::http::{header, HeaderMap};
use std::net::SocketAddr;

/// Resolve the client IP for a request
pub fn resolve_client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    first_forwarded_for(headers)
        .or_else(|| header_value(headers, "x-real-ip"))
        .or_else(|| header_value(headers, "cf-connecting-ip"))
        .unwrap_or_else(|| peer.ip().to_string())
}

/// The `User-Agent` header, when present and valid UTF-8
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;
    xff.split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
