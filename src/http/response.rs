//! Response handling.
//!
//! # Responsibilities
//! - Hand backend responses to the client untouched (status, headers, body)
//! - Build the proxy's own error responses
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - Pool and release headers from the backend are never rewritten
//! - Exhausted failover results in 502 Bad Gateway

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use hyper::body::Incoming;

/// Forward a backend response as-is.
pub fn passthrough(response: Response<Incoming>) -> Response<Body> {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

/// No backend could serve the request.
pub fn gateway_failure() -> Response<Body> {
    plain(StatusCode::BAD_GATEWAY, "Bad Gateway: no upstream available\n")
}

pub fn payload_too_large() -> Response<Body> {
    plain(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large\n")
}

pub fn bad_request(message: &'static str) -> Response<Body> {
    plain(StatusCode::BAD_REQUEST, message)
}

fn plain(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
