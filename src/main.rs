use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::net::TcpListener;

use upgrade_proxy::config::loader;
use upgrade_proxy::lifecycle::signals::spawn_signal_handler;
use upgrade_proxy::net::tls::{ensure_crypto_provider, load_tls_config};
use upgrade_proxy::observability::logging;
use upgrade_proxy::{HttpServer, Shutdown};

/// Reverse proxy that forwards HTTP and tunnels WebSocket upgrades to one backend.
#[derive(Debug, Parser)]
#[command(name = "upgrade-proxy", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match loader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet; fall back to the defaults.
            logging::init(&Default::default());
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    logging::init(&config.observability);
    ensure_crypto_provider();

    tracing::info!("upgrade-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(address = %config.listener.bind_address, "Listening");
    tracing::info!(backend = %config.backend.url, "Forwarding to backend");
    if config.backend.insecure_skip_verify {
        tracing::warn!("Backend TLS verification disabled");
    } else {
        tracing::info!("Backend TLS verification enabled");
    }
    tracing::info!("WebSocket support enabled");

    let tls = match &config.listener.tls {
        Some(tls) => Some(load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?),
        None => None,
    };
    let bind_address = config.listener.bind_address.clone();

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    match tls {
        Some(tls) => {
            let addr: SocketAddr = bind_address.parse()?;
            server.run_tls(addr, tls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
