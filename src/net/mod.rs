//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Ingress:
//!     TcpListener (plain) or axum-server rustls acceptor (tls.rs)
//!     → Hand off to HTTP layer
//!
//! Egress (upgrade path):
//!     TcpStream → optional TLS client handshake (tls.rs)
//!     → BackendStream (stream.rs) → Tunnel
//! ```
//!
//! # Design Decisions
//! - One rustls client policy is shared by every outbound connection
//! - Certificate verification toward the backend is on unless configured off

pub mod stream;
pub mod tls;

pub use stream::BackendStream;
