//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the client sent none
//! - Strip hop-by-hop headers before forwarding
//! - Record the client address in X-Forwarded-For
//! - Reduce the request target to origin form for the backend

use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::{Authority, PathAndQuery, Uri};
use axum::http::Request;
use tower_http::request_id::{MakeRequestId, RequestId, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Request ID generator backed by UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Layer that sets `x-request-id` on inbound requests lacking one.
///
/// Only the request side is touched; backend responses go back unmodified.
pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Request ID for log lines.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Request target for the upstream request line: path and query only.
pub fn origin_form(original: &Uri) -> Uri {
    original
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"))
        .into()
}

/// Fill in `Host` from the backend authority when the client sent none.
pub fn ensure_host(headers: &mut HeaderMap, authority: &Authority) {
    if headers.contains_key(header::HOST) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
        headers.insert(header::HOST, value);
    }
}

/// Copy of `src` ready to forward upstream.
///
/// Drops hop-by-hop headers (including any named in `Connection`) and
/// appends the client to `X-Forwarded-For`.
pub fn forward_headers(src: &HeaderMap, client_addr: Option<SocketAddr>) -> HeaderMap {
    let listed: Vec<HeaderName> = src
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut headers = HeaderMap::with_capacity(src.len() + 1);
    for (name, value) in src {
        if is_hop_by_hop(name) || listed.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let forwarded = match src.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ip),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    headers
}

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}
