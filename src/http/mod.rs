//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (upgrade or ordinary?)
//!         upgrade  → websocket.rs → tunnel
//!         ordinary → forward.rs → backend
//!     → response.rs (error bodies, hop-by-hop headers)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::Forwarder;
pub use request::{is_upgrade_request, UpgradeRequest};
pub use server::{AppState, HttpServer, ServerError};
