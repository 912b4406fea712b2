//! Upgrade handshake wire format.
//!
//! # Responsibilities
//! - Select the inbound headers that take part in the negotiation
//! - Encode the literal HTTP/1.1 upgrade request sent to the backend
//! - Parse the backend's response head into a numeric status and headers
//!
//! # Design Decisions
//! - Header values are opaque: copied byte-for-byte, never interpreted
//! - Headers are an ordered association list, not a map
//! - Acceptance is decided from the parsed status code only, never by
//!   searching the raw bytes

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION,
};
use httparse::Status;

/// Inbound headers copied onto the backend upgrade request, in this order.
pub const FORWARDED_REQUEST_HEADERS: [HeaderName; 4] = [
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION,
    SEC_WEBSOCKET_PROTOCOL,
    AUTHORIZATION,
];

/// Ordered list of handshake headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeHeaders {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HandshakeHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the negotiation headers present on an inbound request.
    ///
    /// Absent or empty headers are skipped, never synthesized.
    pub fn from_request(headers: &HeaderMap) -> Self {
        let mut selected = Self::new();
        for name in FORWARDED_REQUEST_HEADERS.iter() {
            if let Some(value) = headers.get(name).filter(|v| !v.is_empty()) {
                selected.push(name.clone(), value.clone());
            }
        }
        selected
    }

    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// First value recorded under `name`.
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }
}

/// Encode the upgrade request sent to the backend.
///
/// `host` goes into the `Host` header as given; `path_and_query` is copied
/// verbatim into the request line.
pub fn encode_upgrade_request(
    host: &str,
    path_and_query: &str,
    headers: &HandshakeHeaders,
) -> Vec<u8> {
    let target = if path_and_query.is_empty() {
        "/"
    } else {
        path_and_query
    };

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(format!("GET {target} HTTP/1.1\r\n").as_bytes());
    out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    out.extend_from_slice(b"Upgrade: websocket\r\n");
    out.extend_from_slice(b"Connection: Upgrade\r\n");
    for (name, value) in headers.iter() {
        out.extend_from_slice(display_name(name).as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Conventional capitalization for a header name (`Sec-WebSocket-Key`).
fn display_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| match part {
            "websocket" => "WebSocket".to_string(),
            _ => {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// The backend's answer to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HandshakeHeaders,
}

impl HandshakeResponse {
    /// Only `101` counts as acceptance.
    pub fn is_switching_protocols(&self) -> bool {
        self.status == 101
    }
}

/// Result of parsing a (possibly incomplete) response head.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseHead {
    /// The head is complete; `head_len` bytes were consumed.
    Complete {
        response: HandshakeResponse,
        head_len: usize,
    },
    /// More bytes are needed. `status` is set once the status line was read.
    Partial { status: Option<u16> },
}

/// Parse the response head at the start of `buf`.
pub fn parse_response_head(buf: &[u8]) -> Result<ResponseHead, httparse::Error> {
    // The shortest header line is four bytes, so this never runs out of slots.
    let mut headers = vec![httparse::EMPTY_HEADER; buf.len() / 4 + 1];
    let mut response = httparse::Response::new(&mut headers);

    let head_len = match response.parse(buf)? {
        Status::Partial => return Ok(ResponseHead::Partial { status: response.code }),
        Status::Complete(len) => len,
    };

    let mut parsed = HandshakeHeaders::new();
    for header in response.headers.iter() {
        // httparse has already validated the token and value characters.
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_bytes(header.value),
        ) {
            parsed.push(name, value);
        }
    }

    Ok(ResponseHead::Complete {
        response: HandshakeResponse {
            status: response.code.unwrap_or_default(),
            reason: response.reason.unwrap_or_default().to_string(),
            headers: parsed,
        },
        head_len,
    })
}

/// Parse a head cut short by the read bound, keeping its complete lines.
///
/// The partial line at the end of `buf` is discarded. Returns `None` when
/// not even the status line is complete or the kept lines do not parse.
pub fn parse_truncated_head(buf: &[u8]) -> Option<HandshakeResponse> {
    let end = buf.iter().rposition(|&b| b == b'\n')? + 1;
    let mut head = buf[..end].to_vec();
    head.extend_from_slice(b"\r\n");
    match parse_response_head(&head) {
        Ok(ResponseHead::Complete { response, .. }) => Some(response),
        _ => None,
    }
}
