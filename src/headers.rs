//! Header sanitation for the relay path
//! Hop-by-hop stripping, X-Forwarded-For chaining, additive header copy

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

/// Hop-by-hop headers per RFC 9110 §7.6.1: meaningful for a single
/// transport link only, never forwarded by an intermediary. Applied to
/// both the inbound request and the upstream response.
const HOP_BY_HOP_HEADERS: [&str; 5] = [
    "proxy-connection",
    "keep-alive",
    "te",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Remove all hop-by-hop headers in place. Header name matching is
/// case-insensitive (HeaderMap normalizes names to lowercase).
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Append `client_host` to the X-Forwarded-For chain, preserving any
/// existing entries in order. The header may arrive on multiple lines
/// (an upstream proxy chain produces exactly that); all readable values
/// are joined into one comma-separated chain. Sets the header to
/// `client_host` alone when it is absent or no prior value is readable.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_host: &str) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .collect();

    let chain = if prior.is_empty() {
        client_host.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client_host)
    };

    let value = HeaderValue::from_str(&chain)
        .or_else(|_| HeaderValue::from_str(client_host));
    if let Ok(value) = value {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}

/// Append every (name, value) pair from `src` into `dst` without
/// overwriting anything already in `dst`. Preserves multi-value headers.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src.iter() {
        dst.append(name.clone(), value.clone());
    }
}
