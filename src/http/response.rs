//! Error responses and response header hygiene.
//!
//! # Responsibilities
//! - Map tunnel failures to a status code and a short plain-text body
//! - Strip hop-by-hop headers from forwarded messages
//!
//! # Design Decisions
//! - Bodies never include backend addresses or error details; those go to the logs

use axum::http::header::{
    HeaderMap, HeaderName, CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::tunnel::TunnelError;

/// Body of every failed forwarded request.
pub const BAD_GATEWAY_BODY: &str = "Bad Gateway";

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
    CONNECTION,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

impl IntoResponse for TunnelError {
    fn into_response(self) -> Response {
        (self.status_code(), self.client_message()).into_response()
    }
}

/// `502 Bad Gateway` for a forwarded request the backend did not answer.
pub fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, BAD_GATEWAY_BODY).into_response()
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}
