//! Tunnel session state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track session state (Dialing → Handshaking → Relaying → Closed)
//! - Generate unique session IDs for tracing
//! - Count live sessions for logging and tests
//!
//! # Design Decisions
//! - A session is owned by the request path that opened it; it is not shared
//! - Closure happens in `Drop`, so it runs exactly once on every path

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::tunnel::relay::RelayOutcome;

/// Global atomic counter for session IDs.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tunnel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle state of a tunnel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the transport connection to the backend.
    Dialing,
    /// Exchanging the upgrade request/response with the backend.
    Handshaking,
    /// Backend confirmed with 101; bytes are being relayed.
    Relaying,
    /// Both connections released.
    Closed,
}

impl SessionState {
    /// Forward transitions allowed by [`TunnelSession::advance`].
    fn can_advance_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Dialing, SessionState::Handshaking)
                | (SessionState::Handshaking, SessionState::Relaying)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Dialing => "dialing",
            SessionState::Handshaking => "handshaking",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counts live tunnel sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Arc<AtomicU64>,
    opened: Arc<AtomicU64>,
}

impl SessionTracker {
    /// Create a new session tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session in the `Dialing` state.
    pub fn open(&self, backend_url: impl Into<String>) -> TunnelSession {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        let session = TunnelSession {
            id: SessionId::new(),
            state: SessionState::Dialing,
            backend_url: backend_url.into(),
            started: Instant::now(),
            outcome: None,
            active: Arc::clone(&self.active),
        };
        tracing::debug!(session = %session.id, backend = %session.backend_url, "Session opened");
        session
    }

    /// Sessions not yet closed.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Sessions opened since startup.
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }
}

/// One upgrade attempt, from dialing the backend until both connections close.
///
/// The session does not own the connections themselves; it records what
/// happened to them.
#[derive(Debug)]
pub struct TunnelSession {
    id: SessionId,
    state: SessionState,
    backend_url: String,
    started: Instant,
    outcome: Option<RelayOutcome>,
    active: Arc<AtomicU64>,
}

impl TunnelSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Move to the next state. Out-of-order transitions are ignored.
    pub fn advance(&mut self, next: SessionState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                session = %self.id,
                from = %self.state,
                to = %next,
                "Ignoring invalid session transition"
            );
            return;
        }
        tracing::trace!(session = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    /// Close after relaying, recording how the relay ended.
    pub fn finish(mut self, outcome: RelayOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        let reached = self.state;
        self.state = SessionState::Closed;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match &self.outcome {
            Some(outcome) => tracing::info!(
                session = %self.id,
                backend = %self.backend_url,
                ended_by = %outcome.first_finished,
                client_to_backend = outcome.client_to_backend,
                backend_to_client = outcome.backend_to_client,
                elapsed_ms,
                "WebSocket connection closed"
            ),
            None => tracing::debug!(
                session = %self.id,
                backend = %self.backend_url,
                reached = %reached,
                elapsed_ms,
                "Session closed before relaying"
            ),
        }
    }
}
