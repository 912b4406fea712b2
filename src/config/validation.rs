//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the backend origin parses into a usable target
//! - Validate value ranges (timeouts > 0, buffer sizes)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::tunnel::BackendTarget;

/// Smallest handshake buffer that can hold a status line plus a header.
const MIN_HANDSHAKE_BYTES: usize = 16;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend.url {url:?} is invalid: {reason}")]
    BackendUrl { url: String, reason: String },

    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("listener.tls.{0} must not be empty")]
    TlsPath(&'static str),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("handshake.max_response_bytes must be at least {min}, got {0}", min = MIN_HANDSHAKE_BYTES)]
    HandshakeBuffer(usize),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = BackendTarget::parse(&config.backend.url) {
        errors.push(ValidationError::BackendUrl {
            url: config.backend.url.clone(),
            reason: e.to_string(),
        });
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::TlsPath("cert_path"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::TlsPath("key_path"));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    if config.handshake.max_response_bytes < MIN_HANDSHAKE_BYTES {
        errors.push(ValidationError::HandshakeBuffer(
            config.handshake.max_response_bytes,
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.backend.url = "not a url".into();
        config.listener.bind_address = "localhost".into();
        config.timeouts.connect_secs = 0;
        config.handshake.max_response_bytes = 4;
        config.listener.tls = Some(TlsConfig {
            cert_path: "".into(),
            key_path: "key.pem".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ValidationError::BackendUrl { .. }));
        assert!(errors.contains(&ValidationError::TlsPath("cert_path")));
        assert!(errors.contains(&ValidationError::ZeroTimeout("connect_secs")));
        assert!(errors.contains(&ValidationError::HandshakeBuffer(4)));
    }

    #[test]
    fn rejects_unsupported_backend_scheme() {
        let mut config = ProxyConfig::default();
        config.backend.url = "ftp://files.example".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
