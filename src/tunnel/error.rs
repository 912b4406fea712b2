//! Failure kinds of the upgrade path.

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while establishing a tunnel.
///
/// Every variant is terminal for its request; nothing is retried.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The backend did not accept a TCP connection within the connect timeout.
    #[error("timed out connecting to backend {addr} after {}s", .timeout.as_secs_f32())]
    DialTimeout { addr: String, timeout: Duration },

    /// The TCP connection to the backend failed.
    #[error("failed to connect to backend {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The TLS client handshake with the backend failed.
    #[error("TLS handshake with {server_name} failed: {source}")]
    TlsHandshake {
        server_name: String,
        #[source]
        source: io::Error,
    },

    /// Writing the upgrade request or reading the response failed.
    #[error("upgrade handshake with backend failed: {0}")]
    HandshakeIo(#[source] io::Error),

    /// The backend answered with anything other than `101`.
    #[error("backend rejected upgrade ({})", describe_status(.status))]
    HandshakeRejected { status: Option<u16> },

    /// The inbound connection cannot be detached from the HTTP server.
    #[error("inbound connection does not support protocol upgrades")]
    HijackUnsupported,

    /// The client connection failed while switching protocols.
    #[error("client upgrade failed: {0}")]
    ClientUpgrade(#[source] hyper::Error),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no parseable status line".to_string(),
    }
}

impl TunnelError {
    /// Short stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TunnelError::DialTimeout { .. } => "dial_timeout",
            TunnelError::Dial { .. } => "dial_error",
            TunnelError::TlsHandshake { .. } => "tls_handshake_error",
            TunnelError::HandshakeIo(_) => "handshake_io",
            TunnelError::HandshakeRejected { .. } => "handshake_rejected",
            TunnelError::HijackUnsupported => "hijack_unsupported",
            TunnelError::ClientUpgrade(_) => "client_upgrade",
        }
    }

    /// Status returned to the client while the response path is still usable.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TunnelError::HijackUnsupported | TunnelError::ClientUpgrade(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Body returned to the client. Backend details stay in the logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            TunnelError::HijackUnsupported => "HTTP Hijacking not supported",
            TunnelError::ClientUpgrade(_) => "Failed to upgrade connection",
            _ => "Failed to connect to backend",
        }
    }
}
