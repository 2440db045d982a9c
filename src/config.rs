//! Configuration surface.
//!
//! All types derive Serde traits so deployments can load them from TOML
//! files; every option has a default, and loading collects every
//! validation problem before failing rather than stopping at the first.

use std::fs;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::encoding::Protocol;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Client options: default protocol, target endpoint, and the three
/// timeouts plus pool bounds. All timeouts are in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default Thrift protocol for requests and for responses whose
    /// content type is unrecognised.
    pub protocol: Protocol,

    /// Target host.
    pub host: String,

    /// Target port.
    pub port: u16,

    /// Use TLS (host OS trust store).
    pub ssl: bool,

    /// Connect timeout in seconds.
    pub open_timeout: f64,

    /// Per-call receive timeout in seconds.
    pub rpc_timeout: f64,

    /// Idle keep-alive lifetime in seconds.
    pub keep_alive: f64,

    /// Maximum concurrent connections.
    pub pool_size: usize,

    /// Pool-checkout timeout in seconds.
    pub pool_timeout: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Compact,
            host: "localhost".to_string(),
            port: 8080,
            ssl: false,
            open_timeout: 1.0,
            rpc_timeout: 10.0,
            keep_alive: 15.0,
            pool_size: 5,
            pool_timeout: 5.0,
        }
    }
}

impl ClientConfig {
    /// Load and validate from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Semantic checks; collects every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push(ValidationError("host must not be empty".into()));
        }
        if self.pool_size == 0 {
            errors.push(ValidationError("pool_size must be > 0".into()));
        }
        for (name, value) in [
            ("open_timeout", self.open_timeout),
            ("rpc_timeout", self.rpc_timeout),
            ("keep_alive", self.keep_alive),
            ("pool_timeout", self.pool_timeout),
        ] {
            if !value.is_finite() || value <= 0.0 {
                errors.push(ValidationError(format!("{name} must be a positive number")));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

fn default_health_endpoint() -> bool {
    true
}

/// Server options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Expose `GET /health`.
    #[serde(default = "default_health_endpoint")]
    pub health_endpoint: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
            health_endpoint: default_health_endpoint(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        load_config(path)
    }
}

fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
