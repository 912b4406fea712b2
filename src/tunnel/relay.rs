//! Bidirectional byte relay between the client and the backend.
//!
//! # Data Flow
//! ```text
//! client ──read──▶ copy loop (ClientToBackend) ──write──▶ backend
//! client ◀─write── copy loop (BackendToClient) ◀──read── backend
//!                        │
//!                        ▼
//!          completion rendezvous (capacity 2)
//!                        │ first report
//!                        ▼
//!       tear down both loops → both connections dropped
//! ```
//!
//! # Design Decisions
//! - Bytes are copied verbatim; WebSocket framing is never inspected
//! - The first loop to finish, for any reason, ends the session
//! - No half-close: when one direction ends, both connections close
//! - No timeout applies once relaying has started

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Direction of a copy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToBackend => f.write_str("client_to_backend"),
            Direction::BackendToClient => f.write_str("backend_to_client"),
        }
    }
}

/// How a relay ended.
#[derive(Debug)]
pub struct RelayOutcome {
    /// The loop whose completion closed the session.
    pub first_finished: Direction,
    /// Set when that loop stopped on an I/O error rather than end-of-stream.
    pub error: Option<io::Error>,
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

struct Completion {
    direction: Direction,
    result: io::Result<()>,
}

/// Relay bytes between `client` and `backend` until either side terminates.
///
/// Both connections are dropped, and therefore closed, before this returns.
pub async fn relay<C, B>(client: C, backend: B) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let upstream_bytes = Arc::new(AtomicU64::new(0));
    let downstream_bytes = Arc::new(AtomicU64::new(0));
    let (done_tx, mut done_rx) = mpsc::channel::<Completion>(2);

    let upstream = tokio::spawn(copy_loop(
        Direction::ClientToBackend,
        client_read,
        backend_write,
        Arc::clone(&upstream_bytes),
        done_tx.clone(),
    ));
    let downstream = tokio::spawn(copy_loop(
        Direction::BackendToClient,
        backend_read,
        client_write,
        Arc::clone(&downstream_bytes),
        done_tx,
    ));

    // Each loop reports exactly once before its task ends, so a report is
    // always delivered while both senders are alive.
    let first = done_rx.recv().await;

    // Tearing down both tasks drops every half, which closes both
    // connections. The peer loop's own report, if any, is discarded.
    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;
    drop(done_rx);

    let (first_finished, error) = match first {
        Some(Completion { direction, result }) => (direction, result.err()),
        None => (
            Direction::ClientToBackend,
            Some(io::Error::new(io::ErrorKind::Other, "relay loops exited without reporting")),
        ),
    };

    RelayOutcome {
        first_finished,
        error,
        client_to_backend: upstream_bytes.load(Ordering::Relaxed),
        backend_to_client: downstream_bytes.load(Ordering::Relaxed),
    }
}

async fn copy_loop<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    copied: Arc<AtomicU64>,
    done: mpsc::Sender<Completion>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let result = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            break Err(e);
        }
        if let Err(e) = writer.flush().await {
            break Err(e);
        }
        copied.fetch_add(n as u64, Ordering::Relaxed);
    };

    match &result {
        Ok(()) => tracing::trace!(%direction, "Relay direction reached end of stream"),
        Err(e) => tracing::debug!(%direction, error = %e, "Relay direction stopped on error"),
    }
    let _ = done.send(Completion { direction, result }).await;
}
