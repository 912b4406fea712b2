//! Request classification and the read-only upgrade request view.
//!
//! # Responsibilities
//! - Decide whether a request asks for a WebSocket upgrade
//! - Capture method, path, query and headers for the dialer
//!
//! # Design Decisions
//! - Classification is a pure function of the headers
//! - Only the first value of `Upgrade` and `Connection` is considered

use axum::http::header::{HeaderMap, CONNECTION, UPGRADE};
use axum::http::{Method, Request};

/// True iff `Upgrade` is `websocket` and `Connection` mentions `upgrade`.
///
/// `Upgrade` must match exactly, ignoring ASCII case. `Connection` only has
/// to contain `upgrade` somewhere, ignoring ASCII case, so token lists such
/// as `keep-alive, Upgrade` qualify.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let connection = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    upgrade && connection
}

/// Snapshot of an inbound upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
}

impl UpgradeRequest {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            headers: request.headers().clone(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `path[?query]`, copied verbatim.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn headers(upgrade: Option<&str>, connection: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(v) = upgrade {
            map.insert(UPGRADE, HeaderValue::from_str(v).unwrap());
        }
        if let Some(v) = connection {
            map.insert(CONNECTION, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn classifier_truth_table() {
        let cases = [
            (Some("websocket"), Some("Upgrade"), true),
            (Some("WebSocket"), Some("upgrade"), true),
            (Some("WEBSOCKET"), Some("keep-alive, Upgrade"), true),
            (Some("websocket"), Some("UPGRADE,close"), true),
            (Some("websocket"), None, false),
            (None, Some("Upgrade"), false),
            (Some("websocket"), Some("keep-alive"), false),
            (Some("h2c"), Some("Upgrade"), false),
            (Some("websocket2"), Some("Upgrade"), false),
            (Some(" websocket"), Some("Upgrade"), false),
            (None, None, false),
        ];

        for (upgrade, connection, expected) in cases {
            assert_eq!(
                is_upgrade_request(&headers(upgrade, connection)),
                expected,
                "Upgrade={upgrade:?} Connection={connection:?}"
            );
        }
    }

    #[test]
    fn view_copies_path_and_query_verbatim() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/chat/room%201?x=1&y=%2F")
            .header("Sec-WebSocket-Key", "abc")
            .body(Body::empty())
            .unwrap();

        let view = UpgradeRequest::from_request(&request);
        assert_eq!(view.method(), &Method::GET);
        assert_eq!(view.path(), "/chat/room%201");
        assert_eq!(view.query(), Some("x=1&y=%2F"));
        assert_eq!(view.path_and_query(), "/chat/room%201?x=1&y=%2F");
        assert_eq!(view.headers().get("sec-websocket-key").unwrap(), "abc");
    }

    #[test]
    fn missing_query_is_omitted() {
        let request = Request::builder().uri("/socket").body(Body::empty()).unwrap();
        assert_eq!(UpgradeRequest::from_request(&request).path_and_query(), "/socket");
    }
}
