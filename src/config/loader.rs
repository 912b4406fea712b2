//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the backend origin.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";
/// Environment variable overriding the listener bind address.
pub const LISTEN_ADDR_ENV: &str = "LISTEN_ADDR";
/// Environment variable enabling `backend.insecure_skip_verify`.
pub const INSECURE_SKIP_VERIFY_ENV: &str = "INSECURE_SKIP_VERIFY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name} has invalid value {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the runtime configuration: optional file, then process environment.
pub fn load(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Same as [`load`], reading overrides through `env` instead of the process environment.
pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(url) = get(BACKEND_URL_ENV) {
        config.backend.url = url;
    }
    if let Some(addr) = get(LISTEN_ADDR_ENV) {
        config.listener.bind_address = addr;
    }
    if let Some(value) = get(INSECURE_SKIP_VERIFY_ENV) {
        config.backend.insecure_skip_verify = match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::Env {
                    name: INSECURE_SKIP_VERIFY_ENV,
                    value,
                })
            }
        };
    }

    Ok(())
}
