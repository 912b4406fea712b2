//! WebSocket upgrade handling.
//!
//! # Responsibilities
//! - Open a tunnel session for each upgrade request
//! - Dial the backend and negotiate the upgrade before answering the client
//! - Answer `101` and hand both raw connections to the relay
//!
//! # Data Flow
//! ```text
//! Client ──upgrade──▶ Proxy ──dial + handshake──▶ Backend
//! Client ◀───101──── Proxy ◀────────101───────── Backend
//! Client ◀═══════ raw bytes ═══════▶ Backend
//! ```
//!
//! # Design Decisions
//! - Any failure before the 101 becomes a plain error response
//! - The relay runs on its own task after the handler has returned

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tokio::io::AsyncWriteExt;

use crate::http::request::UpgradeRequest;
use crate::http::server::AppState;
use crate::tunnel::dialer::{BackendDialer, BackendHandshake};
use crate::tunnel::switcher::{self, ClientIo};
use crate::tunnel::{relay, SessionState, TunnelError, TunnelSession};

/// Tunnel one upgrade request to the backend.
pub async fn handle_upgrade(state: &AppState, mut request: Request<Body>) -> Response {
    let upgrade = UpgradeRequest::from_request(&request);
    let backend_url = state.target.upgrade_url(&upgrade.path_and_query());

    tracing::info!(
        method = %upgrade.method(),
        path = %upgrade.path(),
        backend = %backend_url,
        "WebSocket upgrade request"
    );

    let mut session = state.sessions.open(backend_url);

    let backend = match establish(&state.dialer, &mut session, &upgrade).await {
        Ok(backend) => backend,
        Err(e) => return reject(&session, e),
    };

    // From here on a failure drops the backend connection with `backend`.
    let on_upgrade = match switcher::detach(&mut request) {
        Ok(on_upgrade) => on_upgrade,
        Err(e) => return reject(&session, e),
    };

    let response = switcher::switching_protocols(&backend.response);

    tokio::spawn(async move {
        match switcher::complete(on_upgrade).await {
            Ok(client) => run_tunnel(session, client, backend).await,
            Err(e) => tracing::warn!(
                session = %session.id(),
                error = %e,
                kind = e.kind(),
                "Client upgrade failed"
            ),
        }
    });

    response
}

async fn establish(
    dialer: &BackendDialer,
    session: &mut TunnelSession,
    upgrade: &UpgradeRequest,
) -> Result<BackendHandshake, TunnelError> {
    let stream = dialer.connect().await?;
    tracing::debug!(session = %session.id(), tls = stream.is_tls(), "Backend connected");

    session.advance(SessionState::Handshaking);
    let backend = dialer.handshake(stream, upgrade).await?;
    tracing::debug!(
        session = %session.id(),
        status = backend.response.status,
        early_bytes = backend.early_data.len(),
        "Backend accepted upgrade"
    );
    Ok(backend)
}

async fn run_tunnel(mut session: TunnelSession, mut client: ClientIo, backend: BackendHandshake) {
    let BackendHandshake {
        stream,
        early_data,
        ..
    } = backend;

    if !early_data.is_empty() {
        let written = match client.write_all(&early_data).await {
            Ok(()) => client.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(session = %session.id(), error = %e, "Client closed before early data");
            return;
        }
    }

    session.advance(SessionState::Relaying);
    tracing::info!(session = %session.id(), backend = %session.backend_url(), "WebSocket connection established");

    let outcome = relay(client, stream).await;
    if let Some(e) = &outcome.error {
        tracing::debug!(session = %session.id(), direction = %outcome.first_finished, error = %e, "Relay ended with error");
    }
    session.finish(outcome);
}

fn reject(session: &TunnelSession, error: TunnelError) -> Response {
    match &error {
        TunnelError::HandshakeRejected { status } => tracing::warn!(
            session = %session.id(),
            backend = %session.backend_url(),
            status = ?status,
            "Backend rejected WebSocket upgrade"
        ),
        _ => tracing::error!(
            session = %session.id(),
            backend = %session.backend_url(),
            error = %error,
            kind = error.kind(),
            "Failed to establish WebSocket tunnel"
        ),
    }
    error.into_response()
}
