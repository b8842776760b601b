// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Loaded from a TOML file, then overridden by command-line flags. Every
//! field has a default so an empty file is valid.
//!
//! ```toml
//! [transport]
//! endpoint = "tcp://0.0.0.0:5555"
//! poll_interval_ms = 500
//!
//! [backend]
//! host = "127.0.0.1"
//! port = 8082
//! username = "admin"
//! password = "admin"
//! login = true
//! request_timeout_secs = 30
//! ```

use crate::publisher::{BackendEndpoint, Credentials};
use crate::transport::DEFAULT_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Inbound socket settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// cmeta backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Inbound request/reply socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// ZeroMQ endpoint to bind.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Receive poll interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TransportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// HTTP backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Log in at startup and authenticate every request.
    #[serde(default = "default_true")]
    pub login: bool,

    /// Per-request timeout in seconds. Unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: default_password(),
            login: true,
            request_timeout_secs: None,
        }
    }
}

impl BackendConfig {
    pub fn endpoint(&self) -> BackendEndpoint {
        BackendEndpoint::new(self.host.clone(), self.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("transport.endpoint is empty".into()));
        }
        if self.transport.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "transport.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.backend.host.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.host is empty".into()));
        }
        if self.backend.port == 0 {
            return Err(ConfigError::Invalid("backend.port must be non-zero".into()));
        }
        if self.backend.login && self.backend.username.is_empty() {
            return Err(ConfigError::Invalid(
                "backend.username is required when login is enabled".into(),
            ));
        }
        if self.backend.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_TOML: &str = r#"
[transport]
endpoint = "tcp://127.0.0.1:6000"
poll_interval_ms = 250

[backend]
host = "cmeta.example.com"
port = 9000
username = "collector"
password = "secret"
login = false
request_timeout_secs = 15
"#;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = BridgeConfig::from_toml("").expect("parse empty");

        assert_eq!(config.transport.endpoint, "tcp://0.0.0.0:5555");
        assert_eq!(config.transport.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.backend.host, "127.0.0.1");
        assert_eq!(config.backend.port, 8082);
        assert_eq!(config.backend.username, "admin");
        assert_eq!(config.backend.password, "admin");
        assert!(config.backend.login);
        assert!(config.backend.request_timeout().is_none());
    }

    #[test]
    fn test_full_toml() {
        let config = BridgeConfig::from_toml(FULL_TOML).expect("parse full");

        assert_eq!(config.transport.endpoint, "tcp://127.0.0.1:6000");
        assert_eq!(config.transport.poll_interval_ms, 250);
        assert_eq!(
            config.backend.endpoint(),
            BackendEndpoint::new("cmeta.example.com", 9000)
        );
        assert_eq!(config.backend.credentials().username, "collector");
        assert_eq!(config.backend.credentials().password, "secret");
        assert!(!config.backend.login);
        assert_eq!(
            config.backend.request_timeout(),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "[transport]\nendpoint = \"\"",
            "[transport]\npoll_interval_ms = 0",
            "[backend]\nhost = \"  \"",
            "[backend]\nport = 0",
            "[backend]\nusername = \"\"",
            "[backend]\nrequest_timeout_secs = 0",
        ];

        for case in cases {
            match BridgeConfig::from_toml(case) {
                Err(ConfigError::Invalid(_)) => {}
                other => panic!("expected Invalid for {:?}, got {:?}", case, other),
            }
        }
    }

    #[test]
    fn test_empty_username_allowed_without_login() {
        let config = BridgeConfig::from_toml("[backend]\nusername = \"\"\nlogin = false")
            .expect("anonymous config");
        assert!(!config.backend.login);
    }

    #[test]
    fn test_ipv6_backend_host() {
        let config = BridgeConfig::from_toml("[backend]\nhost = \"::1\"").expect("ipv6 host");
        assert_eq!(config.backend.endpoint().to_string(), "http://[::1]:8082");
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = BridgeConfig::default();
        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed = BridgeConfig::from_toml(&text).expect("reparse");

        assert_eq!(parsed.transport.endpoint, config.transport.endpoint);
        assert_eq!(parsed.backend.port, config.backend.port);
        assert!(!text.contains("request_timeout_secs"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(FULL_TOML.as_bytes()).expect("write");

        let config = BridgeConfig::from_file(file.path()).expect("load");
        assert_eq!(config.backend.host, "cmeta.example.com");
    }

    #[test]
    fn test_from_missing_file() {
        let err = BridgeConfig::from_file("/nonexistent/cmeta-bridge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = BridgeConfig::from_toml("[backend\nhost = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
