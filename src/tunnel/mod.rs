//! WebSocket tunneling subsystem.
//!
//! # Data Flow
//! ```text
//! upgrade request (classified by http::request)
//!     → dialer.rs (TCP connect, optional TLS, upgrade handshake)
//!     → switcher.rs (detach client connection, send 101)
//!     → relay.rs (two copy loops until either side ends)
//!     → session.rs (state + close logging)
//! ```
//!
//! # Design Decisions
//! - The backend must accept with `101` before the client connection is touched
//! - Bytes are relayed verbatim; frames are never parsed
//! - Errors are terminal and never retried

pub mod dialer;
pub mod error;
pub mod handshake;
pub mod relay;
pub mod session;
pub mod switcher;
pub mod target;

pub use dialer::{BackendDialer, BackendHandshake};
pub use error::TunnelError;
pub use handshake::{HandshakeHeaders, HandshakeResponse};
pub use relay::{relay, Direction, RelayOutcome};
pub use session::{SessionId, SessionState, SessionTracker, TunnelSession};
pub use target::{BackendTarget, TargetError};
