//! Forwarding of ordinary (non-upgrade) requests to the backend.
//!
//! # Responsibilities
//! - Rewrite the request URI and `Host` to the backend origin
//! - Stream request and response bodies through unchanged
//! - Turn upstream failures into `502 Bad Gateway`
//!
//! # Design Decisions
//! - One pooled client for the whole process
//! - HTTP/1.1 toward the backend regardless of the inbound version
//! - The request timeout covers the wait for the response head only
//! - No retries

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{HeaderValue, HOST};
use axum::http::{HeaderName, Request, Version};
use axum::response::{IntoResponse, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;

use crate::http::response::{bad_gateway, strip_hop_by_hop};
use crate::tunnel::BackendTarget;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Sends non-upgrade requests to the configured backend.
#[derive(Clone)]
pub struct Forwarder {
    client: HttpsClient,
    target: Arc<BackendTarget>,
    request_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        target: Arc<BackendTarget>,
        tls_config: ClientConfig,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(connect_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);
        Self {
            client,
            target,
            request_timeout,
        }
    }

    /// Forward `request` and return the backend's response, or `502`.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = match self.target.forward_uri(path_and_query) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(path = %path_and_query, error = %e, "Cannot build backend URI");
                return bad_gateway();
            }
        };

        tracing::info!(
            method = %parts.method,
            path = %parts.uri.path(),
            url = %uri,
            "Proxying request"
        );

        strip_hop_by_hop(&mut parts.headers);
        if let Ok(host) = HeaderValue::from_str(&self.target.authority()) {
            parts.headers.insert(HOST, host);
        }
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr);
        }
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        let pending = self.client.request(Request::from_parts(parts, body));
        match tokio::time::timeout(self.request_timeout, pending).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body)).into_response()
            }
            Ok(Err(e)) => {
                tracing::error!(backend = %self.target, error = %e, "Upstream request failed");
                bad_gateway()
            }
            Err(_) => {
                tracing::error!(
                    backend = %self.target,
                    timeout = ?self.request_timeout,
                    "Upstream request timed out"
                );
                bad_gateway()
            }
        }
    }
}

fn append_forwarded_for(headers: &mut axum::http::HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn forwarded_for_appends_client_ip() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.7:5555".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.7");

        append_forwarded_for(&mut headers, "[::1]:80".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.7, ::1");
    }
}
