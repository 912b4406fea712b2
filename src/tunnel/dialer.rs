//! Backend dialer: connect, optionally wrap in TLS, and negotiate the upgrade.
//!
//! # Responsibilities
//! - Open a TCP connection within the connect timeout
//! - Perform the TLS client handshake for secure targets (SNI = target host)
//! - Send the upgrade request and read the response head within a fixed bound
//! - Return either a live connection or a specific error, never both
//!
//! # Design Decisions
//! - No retries; every failure is final for the request
//! - On any failure the connection is dropped (closed) before returning
//! - Only the connect step is bounded in time

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::ProxyConfig;
use crate::http::request::UpgradeRequest;
use crate::net::BackendStream;
use crate::tunnel::error::TunnelError;
use crate::tunnel::handshake::{
    encode_upgrade_request, parse_response_head, parse_truncated_head, HandshakeHeaders,
    HandshakeResponse, ResponseHead,
};
use crate::tunnel::target::BackendTarget;

/// A backend connection that accepted the upgrade.
#[derive(Debug)]
pub struct BackendHandshake {
    /// Live connection positioned right after the response head.
    pub stream: BackendStream,
    /// The backend's `101` response.
    pub response: HandshakeResponse,
    /// Bytes the backend sent after the response head in the same reads.
    pub early_data: Vec<u8>,
}

/// Opens upgraded connections to the configured backend.
#[derive(Clone)]
pub struct BackendDialer {
    target: Arc<BackendTarget>,
    tls: Option<TlsConnector>,
    connect_timeout: Duration,
    max_response_bytes: usize,
}

impl BackendDialer {
    pub fn new(
        target: Arc<BackendTarget>,
        tls_config: Arc<ClientConfig>,
        connect_timeout: Duration,
        max_response_bytes: usize,
    ) -> Self {
        let tls = target
            .is_secure()
            .then(|| TlsConnector::from(tls_config));
        Self {
            target,
            tls,
            connect_timeout,
            max_response_bytes,
        }
    }

    pub fn from_config(
        config: &ProxyConfig,
        target: Arc<BackendTarget>,
        tls_config: Arc<ClientConfig>,
    ) -> Self {
        Self::new(
            target,
            tls_config,
            Duration::from_secs(config.timeouts.connect_secs),
            config.handshake.max_response_bytes,
        )
    }

    /// Connect and, for secure targets, complete the TLS handshake.
    pub async fn connect(&self) -> Result<BackendStream, TunnelError> {
        let addr = self.target.dial_address();
        tracing::debug!(%addr, timeout = ?self.connect_timeout, "Dialing backend");

        let host = self.target.server_name().to_string();
        let port = self.target.port();
        let tcp = bounded_connect(&addr, self.connect_timeout, TcpStream::connect((host, port)))
            .await?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "Failed to set TCP_NODELAY on backend connection");
        }

        let Some(connector) = &self.tls else {
            return Ok(BackendStream::Plain(tcp));
        };

        let server_name = self.target.server_name().to_string();
        let name = ServerName::try_from(server_name.clone()).map_err(|e| {
            TunnelError::TlsHandshake {
                server_name: server_name.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            }
        })?;

        // On failure the TCP stream is consumed and dropped by the connector.
        let tls = connector
            .connect(name, tcp)
            .await
            .map_err(|source| TunnelError::TlsHandshake {
                server_name,
                source,
            })?;

        Ok(BackendStream::Tls(Box::new(tls)))
    }

    /// Send the upgrade request over `stream` and require a `101` answer.
    pub async fn handshake(
        &self,
        mut stream: BackendStream,
        request: &UpgradeRequest,
    ) -> Result<BackendHandshake, TunnelError> {
        let headers = HandshakeHeaders::from_request(request.headers());
        let (response, early_data) = negotiate(
            &mut stream,
            &self.target.authority(),
            &request.path_and_query(),
            &headers,
            self.max_response_bytes,
        )
        .await?;

        Ok(BackendHandshake {
            stream,
            response,
            early_data,
        })
    }

    /// [`connect`](Self::connect) followed by [`handshake`](Self::handshake).
    pub async fn dial(&self, request: &UpgradeRequest) -> Result<BackendHandshake, TunnelError> {
        let stream = self.connect().await?;
        self.handshake(stream, request).await
    }
}

/// Await `connect`, mapping a timeout to `DialTimeout` and failure to `Dial`.
pub async fn bounded_connect<F, T>(
    addr: &str,
    timeout: Duration,
    connect: F,
) -> Result<T, TunnelError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TunnelError::Dial {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(TunnelError::DialTimeout {
            addr: addr.to_string(),
            timeout,
        }),
    }
}

/// Write the upgrade request and read the response head.
///
/// Reads until the head is complete or `max_response_bytes` have arrived.
/// Returns the response and any bytes received past the head.
///
/// A `101` head longer than the bound is still accepted: its headers are the
/// complete lines inside the bound and the remainder is read and discarded.
pub async fn negotiate<S>(
    stream: &mut S,
    host: &str,
    path_and_query: &str,
    headers: &HandshakeHeaders,
    max_response_bytes: usize,
) -> Result<(HandshakeResponse, Vec<u8>), TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = encode_upgrade_request(host, path_and_query, headers);
    stream
        .write_all(&request)
        .await
        .map_err(TunnelError::HandshakeIo)?;
    stream.flush().await.map_err(TunnelError::HandshakeIo)?;

    let mut buf = vec![0u8; max_response_bytes];
    let mut filled = 0;
    loop {
        let n = stream
            .read(&mut buf[filled..])
            .await
            .map_err(TunnelError::HandshakeIo)?;
        if n == 0 {
            return Err(TunnelError::HandshakeIo(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed the connection during the upgrade handshake",
            )));
        }
        filled += n;

        match parse_response_head(&buf[..filled]) {
            Ok(ResponseHead::Complete { response, head_len }) => {
                if !response.is_switching_protocols() {
                    return Err(TunnelError::HandshakeRejected {
                        status: Some(response.status),
                    });
                }
                return Ok((response, buf[head_len..filled].to_vec()));
            }
            Ok(ResponseHead::Partial { status }) => {
                if filled < buf.len() {
                    continue;
                }
                if status != Some(101) {
                    return Err(TunnelError::HandshakeRejected { status });
                }
                // The code is known even when the reason phrase overran the bound.
                let response = parse_truncated_head(&buf[..filled]).unwrap_or(HandshakeResponse {
                    status: 101,
                    reason: String::new(),
                    headers: HandshakeHeaders::new(),
                });
                tracing::debug!(
                    limit = max_response_bytes,
                    "Upgrade response head exceeds the read bound, discarding the rest"
                );
                let early_data = drain_head(stream, &buf[..filled]).await?;
                return Ok((response, early_data));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Malformed upgrade response from backend");
                return Err(TunnelError::HandshakeRejected { status: None });
            }
        }
    }
}

/// Read and discard the rest of a response head whose start was `seen`.
///
/// Returns the bytes that followed the blank line ending the head.
async fn drain_head<S>(stream: &mut S, seen: &[u8]) -> Result<Vec<u8>, TunnelError>
where
    S: AsyncRead + Unpin,
{
    // The terminator may straddle reads, so carry the last three bytes over.
    let mut window = seen[seen.len().saturating_sub(3)..].to_vec();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(TunnelError::HandshakeIo)?;
        if n == 0 {
            return Err(TunnelError::HandshakeIo(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed the connection inside the upgrade response head",
            )));
        }
        window.extend_from_slice(&chunk[..n]);

        if let Some(pos) = window.windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok(window.split_off(pos + 4));
        }
        let keep_from = window.len().saturating_sub(3);
        window.drain(..keep_from);
    }
}
