//! Error types for readwise-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include the API key or the
//! transport auth token. Variants that could carry sensitive data use
//! generic descriptions instead of echoing the actual values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors returned by the Readwise API client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The API kept answering 429 after all retries were spent.
    #[error("rate limit exceeded after {attempts} attempt(s)")]
    RateLimited {
        /// Number of attempts made, including the first one.
        attempts: u32,
    },

    /// The API rejected the credentials (401/403).
    #[error("authentication failed: the Readwise API rejected the access token")]
    Authentication,

    /// The request never produced an HTTP response.
    #[error("network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// The API answered with an unexpected status code.
    #[error("Readwise API returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response body was not valid JSON.
    #[error("failed to decode API response: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },
}

/// Fatal errors raised while starting or running a transport.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The built-in operations could not be registered.
    #[error(transparent)]
    Registry(#[from] crate::mcp::RegistryError),

    /// The transport failed while serving.
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "api_key must not be empty".to_string(),
        };
        assert!(error.to_string().contains("api_key must not be empty"));
    }

    #[test]
    fn api_error_display_hides_token() {
        let msg = ApiError::Authentication.to_string();
        assert!(msg.contains("authentication failed"));
        assert!(!msg.contains("Token "));
    }

    #[test]
    fn rate_limit_display() {
        let error = ApiError::RateLimited { attempts: 4 };
        assert_eq!(error.to_string(), "rate limit exceeded after 4 attempt(s)");
    }

    #[test]
    fn bind_error_display() {
        let error = ServerError::Bind {
            addr: "127.0.0.1:3000".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(error.to_string().contains("127.0.0.1:3000"));
    }
}
