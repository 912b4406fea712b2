//! Backend origin derived once from configuration.

use axum::http::uri::{InvalidUri, Uri};
use thiserror::Error;
use url::{Host, Url};

/// Reasons a configured backend origin is unusable.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}, expected http or https")]
    Scheme(String),

    #[error("missing host")]
    MissingHost,
}

/// The single backend the proxy talks to.
///
/// `http` targets are reached over plain TCP and upgraded as `ws`; `https`
/// targets over TLS as `wss`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    secure: bool,
    /// Host as it appears in a URL (IPv6 literals bracketed).
    host: String,
    /// Host as used for DNS lookup and server-name indication.
    server_name: String,
    port: Option<u16>,
    /// Path component of the configured origin, without a trailing slash.
    base_path: String,
}

impl BackendTarget {
    /// Parse an origin such as `https://backend.example` or `http://10.0.0.2:3000`.
    pub fn parse(origin: &str) -> Result<Self, TargetError> {
        let url = Url::parse(origin)?;

        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => return Err(TargetError::Scheme(other.to_string())),
        };

        let (host, server_name) = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => {
                (domain.to_string(), domain.to_string())
            }
            Some(Host::Ipv4(ip)) => (ip.to_string(), ip.to_string()),
            Some(Host::Ipv6(ip)) => (format!("[{ip}]"), ip.to_string()),
            _ => return Err(TargetError::MissingHost),
        };

        Ok(Self {
            secure,
            host,
            server_name,
            port: url.port(),
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    /// Whether the backend is reached over TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// `wss` for secure targets, `ws` otherwise.
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// `https` for secure targets, `http` otherwise.
    pub fn http_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Hostname for DNS resolution and TLS server-name indication.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Port to dial: the explicit one, else 443 for secure targets and 80 otherwise.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.secure { 443 } else { 80 })
    }

    /// `host[:port]` exactly as configured; used for the `Host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// `host:port` with the default port filled in.
    pub fn dial_address(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }

    /// Upgrade URL for an inbound path and query, which are copied verbatim.
    pub fn upgrade_url(&self, path_and_query: &str) -> String {
        format!(
            "{}://{}{}",
            self.ws_scheme(),
            self.authority(),
            normalize_path(path_and_query)
        )
    }

    /// URI for forwarding an ordinary request, joined under the origin's base path.
    pub fn forward_uri(&self, path_and_query: &str) -> Result<Uri, InvalidUri> {
        format!(
            "{}://{}{}{}",
            self.http_scheme(),
            self.authority(),
            self.base_path,
            normalize_path(path_and_query)
        )
        .parse()
    }
}

impl std::fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.http_scheme(), self.authority(), self.base_path)
    }
}

fn normalize_path(path_and_query: &str) -> std::borrow::Cow<'_, str> {
    if path_and_query.starts_with('/') {
        path_and_query.into()
    } else {
        format!("/{path_and_query}").into()
    }
}
