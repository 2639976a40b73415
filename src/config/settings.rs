//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Readwise access token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Readwise API client settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "api_key must not be empty".to_string(),
                });
            }
        }

        for (field, url) in [
            ("api.base_url", &self.api.base_url),
            ("api.reader_base_url", &self.api.reader_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError {
                    message: format!("{field} must be an http(s) URL, got '{url}'"),
                });
            }
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "api.timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.port must be greater than zero".to_string(),
            });
        }

        if self.server.session_idle_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.session_idle_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the API key, failing if none was configured.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no key is set by file, flag or environment.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::ValidationError {
                message: "no Readwise API key configured (set api_key, --api-key or READWISE_API_KEY)"
                    .to_string(),
            })
    }
}

/// Readwise API client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the highlights API (v2).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the Reader API (v3).
    #[serde(default = "default_reader_base_url")]
    pub reader_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many times a rate-limited request is retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            reader_base_url: default_reader_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://readwise.io/api/v2".to_string()
}

fn default_reader_base_url() -> String {
    "https://readwise.io/api/v3".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

/// Which transport binding the server runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Line-delimited JSON on stdin/stdout.
    #[default]
    Stdio,
    /// `GET /sse` + `POST /messages`.
    Sse,
    /// Session-correlated `ALL /mcp`.
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http" => Ok(Self::Http),
            other => Err(format!(
                "unknown transport '{other}' (expected stdio, sse or http)"
            )),
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport binding to run.
    #[serde(default)]
    pub transport: TransportKind,

    /// Host to bind the HTTP transports to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind the HTTP transports to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional shared secret gating the streaming endpoints.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Seconds an `/mcp` session may go unused before it is dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            auth_token: None,
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_session_idle_secs() -> u64 {
    1800
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.transport, TransportKind::Stdio);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "api_key": "abc123",
            "api": {
                "base_url": "http://localhost:9000/api/v2",
                "reader_base_url": "http://localhost:9000/api/v3",
                "timeout_secs": 5,
                "max_retries": 1
            },
            "server": {
                "transport": "sse",
                "host": "0.0.0.0",
                "port": 8080,
                "auth_token": "secret",
                "session_idle_secs": 60
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.require_api_key().unwrap(), "abc123");
        assert_eq!(config.api.base_url, "http://localhost:9000/api/v2");
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.api.max_retries, 1);
        assert_eq!(config.server.transport, TransportKind::Sse);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.server.session_idle_secs, 60);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, "https://readwise.io/api/v2");
        assert_eq!(config.reader_base_url, "https://readwise.io/api/v3");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(config.auth_token.is_none());
        assert_eq!(config.session_idle_secs, 1800);
    }

    #[test]
    fn logging_config_defaults() {
        assert_eq!(LoggingConfig::default().level, "warn");
    }

    #[test]
    fn transport_kind_from_str() {
        assert_eq!("SSE".parse::<TransportKind>(), Ok(TransportKind::Sse));
        assert_eq!("http".parse::<TransportKind>(), Ok(TransportKind::Http));
        assert!("websocket".parse::<TransportKind>().is_err());
    }

    #[test]
    fn reject_zero_session_idle() {
        let config: Config =
            serde_json::from_str(r#"{"server": {"session_idle_secs": 0}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_empty_api_key() {
        let config: Config = serde_json::from_str(r#"{"api_key": "  "}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_non_http_base_url() {
        let json = r#"{"api": {"base_url": "ftp://readwise.io"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_port() {
        let config: Config = serde_json::from_str(r#"{"server": {"port": 0}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = Config::default();
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains("READWISE_API_KEY"));
    }

    #[test]
    fn reject_unknown_fields() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"unknown_field": "value"}"#);
        assert!(result.is_err());
    }
}
