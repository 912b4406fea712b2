//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the single proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Dispatch each request to the tunnel or the forwarder
//! - Serve plain HTTP or TLS until shutdown is signalled

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::forward::Forwarder;
use crate::http::request::is_upgrade_request;
use crate::http::websocket;
use crate::net::tls::backend_client_config;
use crate::tunnel::{BackendDialer, BackendTarget, SessionTracker, TargetError};

/// Failures while assembling the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid backend url: {0}")]
    Target(#[from] TargetError),

    #[error("failed to build backend TLS client: {0}")]
    Tls(#[from] rustls::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub target: Arc<BackendTarget>,
    pub dialer: BackendDialer,
    pub forwarder: Forwarder,
    pub sessions: SessionTracker,
}

/// HTTP server for the upgrade proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    sessions: SessionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let target = Arc::new(BackendTarget::parse(&config.backend.url)?);
        let tls = backend_client_config(config.backend.insecure_skip_verify)?;

        let dialer = BackendDialer::from_config(&config, Arc::clone(&target), Arc::new(tls.clone()));
        let forwarder = Forwarder::new(
            Arc::clone(&target),
            tls,
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.request_secs),
        );
        let sessions = SessionTracker::new();

        let state = AppState {
            target,
            dialer,
            forwarder,
            sessions: sessions.clone(),
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            sessions,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Tunnel sessions opened by this server.
    pub fn sessions(&self) -> SessionTracker {
        self.sessions.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` with the given certificate until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            stopper.graceful_shutdown(None);
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Classifies the request, then tunnels or forwards it.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    if is_upgrade_request(request.headers()) {
        websocket::handle_upgrade(&state, request).await
    } else {
        tracing::trace!(method = %request.method(), path = %request.uri().path(), "Forwarding request");
        state.forwarder.forward(request).await
    }
}
