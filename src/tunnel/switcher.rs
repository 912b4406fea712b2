//! Connection switcher: take the client connection out of the HTTP server.
//!
//! # Data Flow
//! ```text
//! inbound request ── detach ──▶ OnUpgrade (pending raw connection)
//! backend 101     ──────────▶ switching_protocols() ──▶ handler response
//!                                  │ hyper writes the head
//!                                  ▼
//!                        complete(OnUpgrade) ──▶ raw client IO ──▶ relay
//! ```
//!
//! # Design Decisions
//! - Detaching happens before the 101 is produced, so a server without
//!   upgrade support still gets a normal 500 response
//! - `Sec-WebSocket-Accept` and `Sec-WebSocket-Protocol` come from the
//!   backend's response, never from the inbound request

use axum::body::Body;
use axum::http::header::{
    HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_PROTOCOL, UPGRADE,
};
use axum::http::{Request, Response, StatusCode};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;

use crate::tunnel::error::TunnelError;
use crate::tunnel::handshake::HandshakeResponse;

/// Raw client connection after the protocol switch.
pub type ClientIo = TokioIo<Upgraded>;

/// Claim the inbound connection's upgrade capability.
///
/// Fails with [`TunnelError::HijackUnsupported`] when the serving layer did
/// not attach one, e.g. for HTTP/2 requests.
pub fn detach<B>(request: &mut Request<B>) -> Result<OnUpgrade, TunnelError> {
    request
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or(TunnelError::HijackUnsupported)
}

/// The `101 Switching Protocols` head sent to the client.
pub fn switching_protocols(backend: &HandshakeResponse) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;

    let headers = response.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Some(accept) = backend.headers.get(&SEC_WEBSOCKET_ACCEPT) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept.clone());
    }
    if let Some(protocol) = backend.headers.get(&SEC_WEBSOCKET_PROTOCOL) {
        headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
    }
    response
}

/// Wait until the 101 has been written and the raw connection is released.
pub async fn complete(on_upgrade: OnUpgrade) -> Result<ClientIo, TunnelError> {
    on_upgrade
        .await
        .map(TokioIo::new)
        .map_err(TunnelError::ClientUpgrade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::handshake::HandshakeHeaders;
    use axum::http::header::HeaderName;

    fn backend_response(pairs: &[(HeaderName, &'static str)]) -> HandshakeResponse {
        let mut headers = HandshakeHeaders::new();
        for (name, value) in pairs {
            headers.push(name.clone(), HeaderValue::from_static(value));
        }
        HandshakeResponse {
            status: 101,
            reason: "Switching Protocols".to_string(),
            headers,
        }
    }

    #[test]
    fn response_headers_come_from_backend() {
        let backend = backend_response(&[
            (SEC_WEBSOCKET_ACCEPT, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
            (SEC_WEBSOCKET_PROTOCOL, "chat.v2"),
            (HeaderName::from_static("x-backend-only"), "1"),
        ]);

        let response = switching_protocols(&backend);

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()[UPGRADE], "websocket");
        assert_eq!(response.headers()[CONNECTION], "Upgrade");
        assert_eq!(
            response.headers()[SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert_eq!(response.headers()[SEC_WEBSOCKET_PROTOCOL], "chat.v2");
        assert!(response.headers().get("x-backend-only").is_none());
    }

    #[test]
    fn protocol_omitted_when_backend_chose_none() {
        let backend = backend_response(&[(SEC_WEBSOCKET_ACCEPT, "abc=")]);
        let response = switching_protocols(&backend);
        assert!(response.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
        assert_eq!(response.headers().len(), 3);
    }

    #[test]
    fn detach_without_upgrade_support_fails() {
        let mut request = Request::builder()
            .uri("/chat")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .header(SEC_WEBSOCKET_PROTOCOL, "client-asked")
            .body(Body::empty())
            .unwrap();

        assert!(matches!(
            detach(&mut request),
            Err(TunnelError::HijackUnsupported)
        ));
    }
}
